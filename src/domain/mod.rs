// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums, and traits that define the core
// concepts of the system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A labelled multiple-choice question and the split identifier
pub mod example;

// Configuration / data / runtime error taxonomy
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
