pub mod test_answer_outside_offer_sent_is_ignored;
pub mod test_busy_session_does_not_stall_others;
pub mod test_missing_tracks_fail_before_sending;
pub mod test_offer_answer_reaches_connected;
pub mod test_unsolicited_offer_is_ignored;
