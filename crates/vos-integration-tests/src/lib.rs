//! Cross-crate integration tests for the Vaspera automation core. See
//! `tests/`.
