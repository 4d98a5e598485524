pub mod analysis_handler;

pub use analysis_handler::{
    __path_analyze, __path_get_result, __path_list_analyses, __path_upload, analyze, get_result,
    list_analyses, upload, AnalysisState,
};
