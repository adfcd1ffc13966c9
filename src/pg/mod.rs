pub mod canon;
pub mod framer;
pub mod recorder;
pub mod replayer;

pub use recorder::PgRecorder;
pub use replayer::PgReplayer;
