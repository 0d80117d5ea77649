use uuid::Uuid;

/// Unique identifier for a memory record.
pub type MemoryId = Uuid;

/// Unique identifier for a memory collection.
pub type CollectionId = Uuid;

/// Unique identifier for a single conversation turn.
pub type TurnId = Uuid;

/// Identifier for the owner of a memory space. Supplied by the identity
/// resolver; Harbor never mints these itself.
pub type OwnerId = String;
