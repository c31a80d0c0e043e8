pub mod category;
pub mod period_type;
pub mod six_stats;
pub mod special_card;
pub mod stat;
pub mod tier;
