use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{bail, Context};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Second loopback address; Linux routes all of 127.0.0.0/8 to `lo`.
pub const LISTEN_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);
pub const TEST_URL: &str = "http://proxyscan.test/generate_204";

const SOCKS_VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

async fn bind(addr: Ipv4Addr) -> anyhow::Result<(TcpListener, SocketAddrV4)> {
    let listener = TcpListener::bind((addr, 0))
        .await
        .with_context(|| format!("binding {addr}"))?;
    match listener.local_addr()? {
        SocketAddr::V4(local) => Ok((listener, local)),
        SocketAddr::V6(local) => bail!("expected an IPv4 socket, got {local}"),
    }
}

/// A port with nothing listening on it at the time of the call.
pub async fn free_port(addr: Ipv4Addr) -> anyhow::Result<u16> {
    let (listener, local) = bind(addr).await?;
    drop(listener);
    Ok(local.port())
}

/// Accepts connections and closes them without a word.
pub async fn spawn_plain_server(addr: Ipv4Addr) -> anyhow::Result<SocketAddrV4> {
    let (listener, local) = bind(addr).await?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    Ok(local)
}

/// A SOCKS5 server that accepts CONNECT to anything and answers the
/// tunnelled HTTP request itself with a 204, so no real upstream is needed.
pub async fn spawn_socks5_server(addr: Ipv4Addr) -> anyhow::Result<SocketAddrV4> {
    let (listener, local) = bind(addr).await?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                // liveness probes connect and leave, which ends up here as an error
                let _ = serve_socks5(stream).await;
            });
        }
    });
    Ok(local)
}

async fn serve_socks5(mut stream: TcpStream) -> anyhow::Result<()> {
    // greeting: VER NMETHODS METHODS...
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        bail!("not a SOCKS5 greeting");
    }
    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&NO_AUTH) {
        stream.write_all(&[SOCKS_VERSION, 0xff]).await?;
        bail!("client offers no usable auth method");
    }
    stream.write_all(&[SOCKS_VERSION, NO_AUTH]).await?;

    // request: VER CMD RSV ATYP DST.ADDR DST.PORT
    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    if request[1] != CMD_CONNECT {
        bail!("only CONNECT is supported");
    }
    let addr_len: usize = match request[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => stream.read_u8().await? as usize,
        other => bail!("unknown address type {other}"),
    };
    let mut dst = vec![0u8; addr_len + 2];
    stream.read_exact(&mut dst).await?;
    stream
        .write_all(&[SOCKS_VERSION, 0x00, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await?;

    // the tunnelled request, answered locally
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            bail!("client closed before finishing the request");
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    stream
        .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
        .await?;
    stream.shutdown().await?;
    Ok(())
}
