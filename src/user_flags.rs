//! Per-user status flags and client option flags.
//!
//! User listings and change notifications carry a status word (field 112)
//! describing each user. Separately, the client sends an options word
//! (field 113) at login and via `SetClientUserInfo` describing how it wants
//! to receive messages.

use bitflags::bitflags;

bitflags! {
    /// Status flags attached to a user record (field 112).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct UserFlags: u16 {
        /// Bit 0: the user holds administrative access.
        const ADMIN = 1 << 0;
        /// Bit 1: the user is idle.
        const IDLE = 1 << 1;
        /// Bit 2: the user refuses private messages.
        const REFUSES_PRIVATE_MESSAGES = 1 << 2;
    }
}

impl UserFlags {
    /// Whether the user holds administrative access.
    #[must_use]
    pub const fn is_admin(self) -> bool { self.contains(Self::ADMIN) }

    /// Whether the user is idle.
    #[must_use]
    pub const fn is_idle(self) -> bool { self.contains(Self::IDLE) }
}

bitflags! {
    /// Client option flags sent in field 113.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ClientOptions: u16 {
        /// Bit 0: refuse private messages from other users.
        const REFUSE_PRIVATE_MESSAGES = 1 << 0;
        /// Bit 1: refuse private chat invitations.
        const REFUSE_CHAT_INVITES = 1 << 1;
        /// Bit 2: send the automatic response text to private messages.
        const AUTOMATIC_RESPONSE = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(UserFlags::ADMIN, 0)]
    #[case(UserFlags::IDLE, 1)]
    #[case(UserFlags::REFUSES_PRIVATE_MESSAGES, 2)]
    fn user_flag_bit_positions(#[case] flag: UserFlags, #[case] bit: u32) {
        assert_eq!(flag.bits(), 1 << bit);
    }

    #[rstest]
    #[case(ClientOptions::REFUSE_PRIVATE_MESSAGES, 0)]
    #[case(ClientOptions::REFUSE_CHAT_INVITES, 1)]
    #[case(ClientOptions::AUTOMATIC_RESPONSE, 2)]
    fn option_bit_positions(#[case] flag: ClientOptions, #[case] bit: u32) {
        assert_eq!(flag.bits(), 1 << bit);
    }

    #[test]
    fn unknown_bits_truncate() {
        let flags = UserFlags::from_bits_truncate(0xFFFF);
        assert!(flags.is_admin());
        assert!(flags.is_idle());
    }
}
