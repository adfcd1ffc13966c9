//! Bidirectional byte pump between a client TCP socket and a protocol
//! `Endpoint`. The connection is considered closed when either direction
//! returns (§4.B).

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::endpoint::Endpoint;

const BUF_SIZE: usize = 8 * 1024;

/// Copies bytes in both directions between `client` and `endpoint` until
/// either side reaches EOF or errors, then returns.
pub async fn pump<E: Endpoint>(client: TcpStream, endpoint: E) {
    let (mut client_rd, mut client_wr) = client.into_split();
    let endpoint_for_read = endpoint.clone();

    let client_to_endpoint = async move {
        let mut buf = [0u8; BUF_SIZE];
        loop {
            let n = client_rd.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            endpoint.write(&buf[..n]).await?;
        }
        Ok::<(), std::io::Error>(())
    };
    let endpoint_to_client = async move {
        let mut buf = [0u8; BUF_SIZE];
        loop {
            let n = endpoint_for_read.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            client_wr.write_all(&buf[..n]).await?;
        }
        let _ = client_wr.shutdown().await;
        Ok::<(), std::io::Error>(())
    };

    tokio::select! {
        _ = client_to_endpoint => {}
        _ = endpoint_to_client => {}
    }
}
