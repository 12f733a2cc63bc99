pub mod cycle;
pub mod publisher;
