//! Service banner grabbing.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use sondr_common::error::ModuleError;
use sondr_common::module::{
    FieldValue, ModuleDescriptor, ModuleOutput, ReconModule, TargetView, caps,
};

const IO_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_BANNER_BYTES: usize = 128;

/// Reads whatever a service volunteers right after the handshake on
/// each known-open port.
pub struct BannerModule {
    descriptor: ModuleDescriptor,
}

impl BannerModule {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new("banner")
                .requires(caps::ADDR)
                .requires(caps::OPEN_PORTS)
                .produces(caps::BANNERS)
                .timeout(Duration::from_secs(15))
                .weight(8),
        }
    }
}

impl Default for BannerModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReconModule for BannerModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn execute(&self, view: &TargetView) -> Result<ModuleOutput, ModuleError> {
        let Some(addr) = view.addrs().first().copied() else {
            return Err(ModuleError::Fatal("target has no resolved address".into()));
        };

        let mut banners = Vec::new();
        for port in view.ports() {
            if let Some(banner) = grab(addr, port).await {
                banners.push(format!("{port}: {banner}"));
            }
        }

        let mut out = ModuleOutput::new();
        out.insert(caps::BANNERS.to_string(), FieldValue::List(banners));
        Ok(out)
    }
}

/// One connect-and-read. Silent services and I/O errors yield nothing;
/// the port was already established as open by a previous module.
async fn grab(addr: IpAddr, port: u16) -> Option<String> {
    let socket_addr = SocketAddr::new(addr, port);
    let mut stream = timeout(IO_TIMEOUT, TcpStream::connect(socket_addr))
        .await
        .ok()?
        .ok()?;

    let mut buffer = [0u8; MAX_BANNER_BYTES];
    let read = timeout(IO_TIMEOUT, stream.read(&mut buffer)).await.ok()?.ok()?;
    if read == 0 {
        return None;
    }

    let banner = String::from_utf8_lossy(&buffer[..read]);
    let banner = banner.trim();
    if banner.is_empty() {
        None
    } else {
        Some(banner.to_string())
    }
}
