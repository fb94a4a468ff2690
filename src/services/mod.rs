pub mod coupons;
pub mod orders;
pub mod returns;
