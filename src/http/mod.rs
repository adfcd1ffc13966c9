pub mod dump;
pub mod framer;
pub mod recorder;
pub mod replayer;
pub mod runner;

use std::path::Path;
use std::sync::Arc;

use crate::store::FilenameFn;

/// Spec-mandated HTTP capture naming (§4.F, §6): `requestN.data`,
/// `responseN.data`, `responseN.err` — distinct from the `{index}.request`/
/// `{index}.response`/`{index}.response.err` convention RESP and PostgreSQL
/// use. Shared by the recorder (which writes captures), the live replayer,
/// and the verification runner (both of which read them back), so all three
/// agree on layout by construction.
pub fn request_name(dir: &Path) -> FilenameFn {
    let dir = dir.to_path_buf();
    Arc::new(move |index| dir.join(format!("request{index}.data")))
}

pub fn response_name(dir: &Path) -> FilenameFn {
    let dir = dir.to_path_buf();
    Arc::new(move |index| dir.join(format!("response{index}.data")))
}

pub fn error_name(dir: &Path) -> FilenameFn {
    let dir = dir.to_path_buf();
    Arc::new(move |index| dir.join(format!("response{index}.err")))
}
