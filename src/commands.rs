pub mod eval_response;
pub mod eval_search;
pub mod pipeline;
pub mod report;
