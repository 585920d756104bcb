pub mod entry;
pub use self::entry::{CacheObject, CacheVersion, DumpEntry};

pub mod record;

pub mod layout;
pub use self::layout::DumpLayout;

pub mod lock;
pub use self::lock::StripedLock;

pub mod writer;
pub use self::writer::{PartitionWriter, WriterStats};

pub(crate) mod files;

mod orchestrator;
pub use self::orchestrator::{DumpRequest, DumpSummary, Orchestrator};

mod recovery;
pub use self::recovery::{recover, RecoveryReport};

mod reader;
pub use self::reader::{Dump, DumpConsumer, DumpIterator, DumpReader};

mod checker;
pub use self::checker::{CheckReport, Checker, PartitionConflict, PartitionHash, PartitionKey};
