//! Pipeline-wide size constants, referenced from configuration range checks
//! the way `internal/constants` is referenced throughout the reference
//! implementation's `getopt` tags (`[0:MaxPayload]`).

/// Hard ceiling on a single serialized block. Oversized content is a sanity
/// violation, never a recoverable error: something upstream (chunker config,
/// collector fan-in) is broken if it is ever hit.
pub const MAX_BLOCK_WIRE_SIZE: usize = 4 * 1024 * 1024;

/// Largest payload a single leaf chunk may carry. Chunker `max_size` options
/// are range-checked against this at construction time.
pub const MAX_LEAF_PAYLOAD_SIZE: usize = 1024 * 1024 * 1024;
