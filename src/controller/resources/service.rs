//! ClusterIP Service in front of the viewer.

use super::{child_metadata, labels};
use crate::constants::{VIEWER_PORT, VIEWER_PORT_NAME};
use crate::crd::Invoice;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

pub(super) fn service_endpoint(invoice: &Invoice) -> Service {
    Service {
        metadata: child_metadata(invoice),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels(&invoice.name_any())),
            ports: Some(vec![ServicePort {
                name: Some(VIEWER_PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: VIEWER_PORT,
                target_port: Some(IntOrString::String(VIEWER_PORT_NAME.to_string())),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::resources::tests::invoice;
    use crate::crd::InvoiceSpec;

    #[test]
    fn test_service_forwards_named_port() {
        let service = service_endpoint(&invoice(InvoiceSpec::default()));
        let spec = service.spec.unwrap();

        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(spec.selector, Some(labels("inv1")));

        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 3030);
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(
            ports[0].target_port,
            Some(IntOrString::String("http".to_string()))
        );
    }
}
