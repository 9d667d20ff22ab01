pub mod batch;
pub mod loaders;
pub mod metric;
pub mod progress;
pub mod term;

pub use batch::{Batch, BatchId};
pub use loaders::{load_term_list, TermList};
pub use metric::{BatchSizeMetric, MetricsSnapshot};
pub use progress::{Progress, RunEvent, RunState};
pub use term::{merge_explanations, Explanation, ExplanationMap, SubjectContext, Term};
