pub mod inspect;
pub mod transform_data;
