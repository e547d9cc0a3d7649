//! Scriptable in-memory soft AP driver used to integration test the manager and to demo it
//! without real hardware.

pub mod mock_driver;
