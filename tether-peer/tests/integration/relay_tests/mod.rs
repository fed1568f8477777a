pub mod test_not_ready_messages_flush_in_order;
pub mod test_offer_sent_before_answerer_joins;
