//! The `Endpoint` trait is the Rust analogue of the Go `io.ReadWriteCloser`
//! this engine's "backend" side implements: a recording tap in record mode,
//! a matcher in replay mode. Methods take `&self` (not `&mut self`) because
//! every implementation guards its state with its own mutex, so a single
//! cheaply-cloned handle can be driven by the two independent pump
//! directions concurrently (§5: "Read and write are protected by separate
//! mutexes").

use std::future::Future;

pub trait Endpoint: Clone + Send + Sync + 'static {
    fn read(&self, buf: &mut [u8]) -> impl Future<Output = std::io::Result<usize>> + Send;
    fn write(&self, buf: &[u8]) -> impl Future<Output = std::io::Result<usize>> + Send;
}
