pub mod generation_type;
pub mod pipeline_state;
