pub mod catalog;
pub mod config;
pub mod executor;
pub mod expander;
pub mod reporter;
pub mod session;
pub mod template;

pub use catalog::{PayloadCatalog, PayloadEntry, PayloadSet};
pub use config::{ArgfuzzConfig, ConfigError};
pub use executor::{CommandExecutor, CommandExecutorConfig, ExecutionFault, RunOutcome};
pub use expander::{ExpandError, ExpandedCase, Expansion, expand};
pub use reporter::{Rejection, Reporter, TextReporter, render};
pub use session::FuzzSession;
pub use template::{ArgumentTemplate, TemplateError, Token, parse_line, parse_script};
