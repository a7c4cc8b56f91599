// Integration tests only; see tests/smoke.rs.
