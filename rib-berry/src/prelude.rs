//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Point3};

pub use crate::{Affine, Frame, LabelVolume};
pub use crate::{Budget, CancelToken, Error, Result};

pub use crate::components::{Component, Components, Connectivity, ExtractMode, Extractor};

pub use crate::consts::canonical::{BACKGROUND, COSTAL_CARTILAGE, STERNUM};
pub use crate::consts::{Side, PASS_THRESHOLD};

pub use crate::eval::{
    BaselineComparison, CaseScore, EvalConfig, Evaluator, MatchMode, Outcome, Severity, Verdict,
};
pub use crate::pipeline::{BatchReport, Case, Pipeline, PipelineConfig};
pub use crate::relabel::{Midline, RelabelConfig, Relabeled, Relabeler};
pub use crate::taxonomy::Taxonomy;
