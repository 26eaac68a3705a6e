//! dotcall CLI library: the demo services and the command implementations
//! behind the `dotcall` binary, exposed for integration tests.

pub mod commands;
pub mod services;
