//! Integration test driver for `tests/integration/` submodule.
//!
//! The dispatcher runs against recording mocks and a fake clock; no radio,
//! broker or network is involved.

mod dispatcher_tests;
mod mock_hw;
