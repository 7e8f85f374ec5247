//! Integration tests for the script host
//!
//! Full runs through [`Host`](crate::host::Host): real files on disk,
//! concurrent environments, shared output and the debug session.
