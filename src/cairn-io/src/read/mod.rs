pub mod aim;
pub mod panel;
