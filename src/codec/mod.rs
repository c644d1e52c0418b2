//! Wire codec: primitive types, field tables, content properties and the
//! frame envelope that carries them.

pub mod field_table;
pub mod frame;
pub mod primitive;
pub mod properties;
