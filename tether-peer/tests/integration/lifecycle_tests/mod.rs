pub mod test_close_is_idempotent;
pub mod test_transport_failure_closes_session;
