use bitflags::bitflags;

bitflags! {
    /// Permission bits as computed by the chat service for a message author.
    /// Only the bits the command table checks are named; others are kept
    /// through `from_bits_retain`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u64 {
        const ADMINISTRATOR         = 1 << 3;
    }
}

impl Permissions {
    /// Whether an author holding `self` may run a command requiring `required`.
    /// ADMINISTRATOR implies every permission.
    pub fn allows(self, required: Permissions) -> bool {
        self.contains(Permissions::ADMINISTRATOR) || self.contains(required)
    }
}
