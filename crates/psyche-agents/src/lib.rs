pub mod builtin;
pub mod lexicon;
pub mod registry;

pub use builtin::big_five::BigFiveAgent;
pub use builtin::enneagram::EnneagramAgent;
pub use builtin::ifs_parts::IfsPartsAgent;
pub use builtin::report::ReportAgent;
pub use builtin::text_features::TextFeatureAgent;
pub use builtin::translation::TranslationAgent;
pub use builtin::values::ValuesAgent;
pub use builtin::NodeConfig;
pub use registry::AgentCatalog;
