//! Contract-first verification: conditions, contracts, registry, structural
//! validation, and the commit-time hook.

pub mod contract;
pub mod hook;
pub mod registry;
pub mod validator;

pub use contract::{
    AgentContract, Condition, ConditionResult, ConditionType, ContextPredicate,
    ContractEvaluationResult, EvaluationOptions, Severity, VerificationMethod,
};
pub use hook::{
    ContractOutcome, ContractStatus, HookConfig, HookMode, HookReport, ReportFormat,
    VerificationHook,
};
pub use registry::ContractRegistry;
pub use validator::{
    ContractValidator, IssueSeverity, ValidationIssue, ValidationReport, ValidatorOptions,
};
