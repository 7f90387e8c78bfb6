use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

/// Runs a protocol-agnostic full-duplex relay between two connections.
///
/// Bytes are copied in both directions concurrently until one direction
/// reaches end-of-stream or fails. The first direction to finish wins: the
/// other direction is cancelled on the spot and any writes still in flight
/// toward the slower side are abandoned. There is no drain or linger period.
///
/// Both connections are consumed, so every stream half is dropped by the
/// time this returns and the two connections close together.
///
/// Returns the number of bytes moved by the direction that ended the relay,
/// or its I/O error.
pub async fn relay<A, B>(a: A, b: B) -> io::Result<u64>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = tokio::io::copy(&mut a_read, &mut b_write);
    let b_to_a = tokio::io::copy(&mut b_read, &mut a_write);

    // First EOF or error in either direction ends the relay; select! drops
    // the unfinished copy future, which is the cancellation signal for the
    // other direction.
    tokio::select! {
        result = a_to_b => {
            tracing::trace!("relay ended by a->b direction");
            result
        }
        result = b_to_a => {
            tracing::trace!("relay ended by b->a direction");
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    use super::*;

    const TICK: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn bytes_pass_through_unchanged_in_both_directions() {
        let (mut client, client_far) = tokio::io::duplex(64);
        let (mut daemon, daemon_far) = tokio::io::duplex(64);
        let relay_task = tokio::spawn(relay(client_far, daemon_far));

        client.write_all(b"GET /_ping HTTP/1.1\r\n\r\n").await.unwrap();
        let mut buf = [0u8; 23];
        daemon.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET /_ping HTTP/1.1\r\n\r\n");

        daemon.write_all(b"OK").await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"OK");

        drop(client);
        timeout(TICK, relay_task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn chunked_writes_arrive_in_order() {
        let (mut client, client_far) = tokio::io::duplex(16);
        let (mut daemon, daemon_far) = tokio::io::duplex(16);
        tokio::spawn(relay(client_far, daemon_far));

        let writer = tokio::spawn(async move {
            for chunk in [&b"alpha"[..], b"beta", b"gamma", b"delta"] {
                client.write_all(chunk).await.unwrap();
            }
            client
        });

        let mut received = vec![0u8; 19];
        daemon.read_exact(&mut received).await.unwrap();
        assert_eq!(received, b"alphabetagammadelta".to_vec());
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn first_eof_closes_the_other_connection() {
        let (client, client_far) = tokio::io::duplex(64);
        let (mut daemon, daemon_far) = tokio::io::duplex(64);
        let relay_task = tokio::spawn(relay(client_far, daemon_far));

        // Client hangs up without sending anything.
        drop(client);

        let finished = timeout(TICK, relay_task).await.unwrap().unwrap();
        assert_eq!(finished.unwrap(), 0);

        // The daemon side must observe end-of-stream promptly.
        let mut buf = [0u8; 1];
        let n = timeout(TICK, daemon.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn eof_on_the_daemon_side_also_ends_the_relay() {
        let (mut client, client_far) = tokio::io::duplex(64);
        let (daemon, daemon_far) = tokio::io::duplex(64);
        let relay_task = tokio::spawn(relay(client_far, daemon_far));

        drop(daemon);

        timeout(TICK, relay_task).await.unwrap().unwrap().unwrap();
        let mut buf = [0u8; 1];
        let n = timeout(TICK, client.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn relay_works_over_real_tcp_sockets() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (mut daemon, daemon_far) = tokio::io::duplex(64);

        tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            relay(conn, daemon_far).await
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        daemon.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        daemon.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
