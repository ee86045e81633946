//! TCP connect probing.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use sondr_common::error::ModuleError;
use sondr_common::module::{
    FieldValue, ModuleDescriptor, ModuleOutput, ReconModule, TargetView, caps,
};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(400);

/// Connect-scans a port list against the target's first known address.
/// A completed handshake marks the port open; refusals and timeouts
/// mark it closed or filtered, neither fails the unit.
pub struct TcpPortModule {
    descriptor: ModuleDescriptor,
    ports: Vec<u16>,
}

impl TcpPortModule {
    pub fn new(ports: Vec<u16>) -> Self {
        Self {
            descriptor: ModuleDescriptor::new("tcp-ports")
                .requires(caps::ADDR)
                .produces(caps::OPEN_PORTS)
                .timeout(Duration::from_secs(30))
                .weight(8),
            ports,
        }
    }
}

#[async_trait]
impl ReconModule for TcpPortModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn execute(&self, view: &TargetView) -> Result<ModuleOutput, ModuleError> {
        let Some(addr) = view.addrs().first().copied() else {
            return Err(ModuleError::Fatal("target has no resolved address".into()));
        };

        let mut open = Vec::new();
        for &port in &self.ports {
            if probe(addr, port).await {
                open.push(port);
            }
        }
        debug!("{}: {} of {} ports open", view.target(), open.len(), self.ports.len());

        let mut out = ModuleOutput::new();
        out.insert(caps::OPEN_PORTS.to_string(), FieldValue::Ports(open));
        Ok(out)
    }
}

async fn probe(addr: IpAddr, port: u16) -> bool {
    let socket_addr = SocketAddr::new(addr, port);
    matches!(
        timeout(CONNECT_TIMEOUT, TcpStream::connect(socket_addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sondr_common::network::target::Target;
    use std::collections::BTreeMap;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn finds_a_listening_port_and_skips_a_closed_one() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        // An ephemeral port we just released is as good as closed.
        let closed_port = {
            let extra = TcpListener::bind("127.0.0.1:0").await.unwrap();
            extra.local_addr().unwrap().port()
        };

        let module = TcpPortModule::new(vec![open_port, closed_port]);
        let target = Target::from_addr("127.0.0.1".parse().unwrap());
        let view = TargetView::new(target, BTreeMap::new());

        let out = module.execute(&view).await.unwrap();
        assert_eq!(
            out.get(caps::OPEN_PORTS),
            Some(&FieldValue::Ports(vec![open_port]))
        );
    }

    #[tokio::test]
    async fn unresolved_target_is_fatal() {
        let module = TcpPortModule::new(vec![80]);
        let target = Target::from_hostname("example.com".into());
        let view = TargetView::new(target, BTreeMap::new());

        let err = module.execute(&view).await.unwrap_err();
        assert!(matches!(err, ModuleError::Fatal(_)));
    }
}
