//! # Constants
//!
//! Fixed values shared across the controller.

use std::time::Duration;

/// Field manager / component name used for status patches and logs
pub const FIELD_MANAGER: &str = "invoice-controller";

/// Annotation listing the label and annotation keys the controller wrote on a child
pub const MANAGED_METADATA_ANNOTATION: &str = "invoicing.dev/managed-metadata";

/// Annotation holding the SHA-256 of the pod template a Deployment was built from
pub const TEMPLATE_HASH_ANNOTATION: &str = "invoicing.dev/template-hash";

/// Delay before a failed pass (or failed status write) is retried
pub const FAILURE_REQUEUE_DELAY: Duration = Duration::from_secs(15);

/// Default HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default server startup timeout in seconds
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default server readiness poll interval in milliseconds
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default upper bound on a single reconcile pass in seconds
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 120;

/// Default number of invoices reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 4;

/// Key of the generated document inside the data carrier Secret
pub const DOCUMENT_KEY: &str = "pdf";

/// File name the document is projected to inside the viewer container
pub const DOCUMENT_FILE_NAME: &str = "invoice.pdf";

/// Mount path of the data carrier volume in the viewer container
pub const DOCUMENT_MOUNT_PATH: &str = "/etc/config";

/// Port the viewer listens on and the Service forwards
pub const VIEWER_PORT: i32 = 3030;

/// Name of the viewer container port
pub const VIEWER_PORT_NAME: &str = "http";

/// Default viewer container name
pub const DEFAULT_WORKLOAD_NAME: &str = "viewer";

/// Default viewer image
pub const DEFAULT_WORKLOAD_IMAGE: &str = "viewer:latest";

/// Default viewer image pull policy
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "Never";

/// Default ingress class
pub const DEFAULT_INGRESS_CLASS: &str = "nginx";
