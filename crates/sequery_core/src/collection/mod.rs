pub mod equality;
pub mod lookup;
