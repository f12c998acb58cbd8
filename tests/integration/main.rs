//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the controller end to end
//! against simulated devices, a manual clock and an in-memory store.

mod controller_tests;
mod mock_hw;
