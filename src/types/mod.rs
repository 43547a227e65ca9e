pub mod aggregate;
pub mod point;
pub mod price;
pub mod worker;
