//! HTTP handlers: thin translation between the JSON surface and the
//! service layer. All authorization decisions live in the services; the
//! handlers only extract the [`Actor`](crate::auth::Actor) and forward it.

pub mod auth;
pub mod coupons;
pub mod orders;
pub mod returns;
