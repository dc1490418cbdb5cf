//! Client configuration.
//!
//! Tunable timeouts, ports, and transfer behaviour, loaded in layers:
//! built-in defaults, then an optional `.mxc.toml`, then `MXC_*` environment
//! variables. CLI flags (when running the `mxc` binary) override the lot.

#![expect(
    clippy::integer_division,
    reason = "millisecond period from a nonzero hz"
)]

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Default control port when none is specified.
pub const DEFAULT_PORT: u16 = 5500;

/// Wire text encoding preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringEncoding {
    /// Classic MacRoman with UTF-8 auto-detection on decode.
    #[default]
    MacRoman,
    /// UTF-8 throughout, for servers advertising it.
    Utf8,
}

/// Policy for the folder-upload `resume-file` action.
///
/// The action's reference semantics were never pinned down; restarting from
/// byte zero is what shipped clients do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// Treat `resume-file` exactly like `send-file`.
    #[default]
    RestartFromZero,
}

/// Runtime configuration for sessions, transfers, and the tracker client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Control port used when an address does not name one.
    pub default_port: u16,
    /// Seconds to wait for a transaction reply.
    pub reply_timeout_seconds: u64,
    /// Seconds to wait for the control handshake reply.
    pub handshake_timeout_seconds: u64,
    /// Seconds between keep-alive transactions.
    pub keep_alive_interval_seconds: u64,
    /// Chunk size for transfer streaming.
    pub download_chunk_bytes: usize,
    /// Upper bound on transfer progress callback rate.
    pub progress_emit_hz: u32,
    /// Offset added to the control port to reach the transfer port.
    pub transfer_port_offset: u16,
    /// Wire text encoding preference.
    pub string_encoding: StringEncoding,
    /// Folder-upload resume behaviour.
    pub resume_policy: ResumePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            reply_timeout_seconds: 30,
            handshake_timeout_seconds: 15,
            keep_alive_interval_seconds: 180,
            download_chunk_bytes: 64 * 1024,
            progress_emit_hz: 20,
            transfer_port_offset: 1,
            string_encoding: StringEncoding::default(),
            resume_policy: ResumePolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `.mxc.toml` and `MXC_*` environment variables
    /// layered over the defaults.
    ///
    /// # Errors
    /// Returns any error reported by the underlying providers.
    #[must_use = "handle the result"]
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(".mxc.toml"))
            .merge(Env::prefixed("MXC_"))
            .extract()
    }

    /// Reply deadline as a [`Duration`].
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_seconds)
    }

    /// Handshake deadline as a [`Duration`].
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }

    /// Keep-alive period as a [`Duration`].
    #[must_use]
    pub const fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_seconds)
    }

    /// Minimum spacing between transfer progress emissions.
    #[must_use]
    pub const fn progress_interval(&self) -> Duration {
        let hz = if self.progress_emit_hz == 0 {
            1
        } else {
            self.progress_emit_hz as u64
        };
        Duration::from_millis(1000 / hz)
    }

    /// Transfer port derived from a control port.
    #[must_use]
    pub const fn transfer_port(&self, control_port: u16) -> u16 {
        control_port.wrapping_add(self.transfer_port_offset)
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_protocol_conventions() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.default_port, 5500);
        assert_eq!(cfg.reply_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.handshake_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.transfer_port(5500), 5501);
        assert_eq!(cfg.download_chunk_bytes, 65536);
    }

    #[rstest]
    fn env_overrides_defaults() {
        Jail::expect_with(|j| {
            j.set_env("MXC_REPLY_TIMEOUT_SECONDS", "5");
            j.set_env("MXC_DEFAULT_PORT", "6500");
            let cfg = ClientConfig::load().expect("load");
            assert_eq!(cfg.reply_timeout_seconds, 5);
            assert_eq!(cfg.default_port, 6500);
            Ok(())
        });
    }

    #[rstest]
    fn loads_from_dotfile() {
        Jail::expect_with(|j| {
            j.create_file(".mxc.toml", "download_chunk_bytes = 1024")?;
            let cfg = ClientConfig::load().expect("load");
            assert_eq!(cfg.download_chunk_bytes, 1024);
            Ok(())
        });
    }

    #[rstest]
    fn env_overrides_dotfile() {
        Jail::expect_with(|j| {
            j.create_file(".mxc.toml", "progress_emit_hz = 5")?;
            j.set_env("MXC_PROGRESS_EMIT_HZ", "50");
            let cfg = ClientConfig::load().expect("load");
            assert_eq!(cfg.progress_emit_hz, 50);
            Ok(())
        });
    }

    #[test]
    fn zero_hz_still_produces_an_interval() {
        let cfg = ClientConfig {
            progress_emit_hz: 0,
            ..ClientConfig::default()
        };
        assert_eq!(cfg.progress_interval(), Duration::from_secs(1));
    }
}
