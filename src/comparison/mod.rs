// ==========================================
// 文件导入管道 - 比对规则引擎层
// ==========================================
// 职责: 一组可按名称独立调用的校验原语，及其调度引擎
// ==========================================

pub mod checks;
pub mod date_format;
pub mod engine;
pub mod primitives;
pub mod summary;

pub use checks::{reference_message, CheckOutcome, ReferenceLookup};
pub use engine::{ComparisonEngine, CustomComparison};
pub use primitives::{composite_key, coerce_float, required_fields_message, valid_date};
pub use summary::summarize;
