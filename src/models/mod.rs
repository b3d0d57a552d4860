//! # Models
//!
//! The fixed-effects GLM used for initial estimates and the penalized GLMM
//! object a fine search starts from.

pub mod glm;
pub mod pglmm;
