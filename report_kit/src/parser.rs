//! # Result Parser
//!
//! Loads kube-bench JSON output and extracts statistics and test lists from it.
//!
//! ## Usage
//!
//! ```ignore
//! let doc = parser::parse("/tmp/kube-bench-results/output.json")?;
//! let summary = parser::extract_summary(&doc);
//! for finding in parser::failed_tests(&doc) {
//!     println!("{} {}", finding.control_id, finding.description);
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use crate::document::{ScanDocument, Status};
use crate::error::ParseError;
use crate::projector::{Summary, SummaryProjector};

/// A single test result flattened together with its control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub control_id: String,
    pub test_number: String,
    pub status: Status,
    pub description: String,
    pub remediation: String,
}

/// Parse a result file into a [`ScanDocument`]
///
/// The file is decoded straight from a buffered reader.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<ScanDocument, ParseError> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            if source.is_io() {
                ParseError::Read {
                    path: path.to_path_buf(),
                    source: source.into(),
                }
            } else {
                ParseError::InvalidJson {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

    if !value.is_object() {
        return Err(ParseError::NotAnObject {
            path: path.to_path_buf(),
            found: json_type_name(&value),
        });
    }

    log::debug!("Parsed kube-bench result file {}", path.display());
    Ok(ScanDocument::from_value(value))
}

/// Summary computed purely by tallying every result's status
///
/// Unrecognised statuses count toward no bucket and not toward the total.
/// A document without `Controls` yields an all-zero summary.
pub fn extract_summary(doc: &ScanDocument) -> Summary {
    SummaryProjector::tally_only().project(doc)
}

/// All results with the given status, in control order
pub fn list_by_status(doc: &ScanDocument, status: Status) -> Vec<Finding> {
    let mut findings = Vec::new();

    for control in doc.controls() {
        let control_id = control.id();
        for result in control.results() {
            if result.status() == Some(status) {
                findings.push(Finding {
                    control_id: control_id.clone(),
                    test_number: result.test_number(),
                    status,
                    description: result.description(),
                    remediation: result.remediation(),
                });
            }
        }
    }

    findings
}

pub fn failed_tests(doc: &ScanDocument) -> Vec<Finding> {
    list_by_status(doc, Status::Fail)
}

pub fn warning_tests(doc: &ScanDocument) -> Vec<Finding> {
    list_by_status(doc, Status::Warn)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Fixture
// ============================================================================

/// A representative sample document for exercising the rendering path
///
/// Deterministic: every call returns an identical document. Control totals,
/// `Totals` and the per-result statuses all agree.
pub fn fixture() -> ScanDocument {
    ScanDocument::from_value(json!({
        "Controls": [
            {
                "id": "1",
                "version": "cis-1.9",
                "detected_version": "1.29",
                "text": "Control Plane Security Configuration",
                "node_type": "master",
                "tests": [
                    {
                        "section": "1.1",
                        "desc": "Control Plane Node Configuration Files",
                        "results": [
                            {
                                "test_number": "1.1.1",
                                "test_desc": "Ensure that the API server pod specification file permissions are set to 600 or more restrictive (Automated)",
                                "status": "PASS",
                                "remediation": "Run the below command (based on the file location on your system) on the control plane node.\nFor example, chmod 600 /etc/kubernetes/manifests/kube-apiserver.yaml"
                            },
                            {
                                "test_number": "1.1.2",
                                "test_desc": "Ensure that the API server pod specification file ownership is set to root:root (Automated)",
                                "status": "PASS",
                                "remediation": "chown root:root /etc/kubernetes/manifests/kube-apiserver.yaml"
                            },
                            {
                                "test_number": "1.1.12",
                                "test_desc": "Ensure that the etcd data directory ownership is set to etcd:etcd (Automated)",
                                "status": "FAIL",
                                "remediation": "On the etcd server node, get the etcd data directory, passed as an argument --data-dir.\nRun chown etcd:etcd /var/lib/etcd"
                            }
                        ]
                    },
                    {
                        "section": "1.2",
                        "desc": "API Server",
                        "results": [
                            {
                                "test_number": "1.2.1",
                                "test_desc": "Ensure that the --anonymous-auth argument is set to false (Manual)",
                                "status": "WARN",
                                "remediation": "Edit the API server pod specification file /etc/kubernetes/manifests/kube-apiserver.yaml and set --anonymous-auth=false"
                            },
                            {
                                "test_number": "1.2.16",
                                "test_desc": "Ensure that the --profiling argument is set to false (Automated)",
                                "status": "FAIL",
                                "remediation": "Edit the API server pod specification file and set --profiling=false"
                            },
                            {
                                "test_number": "1.2.18",
                                "test_desc": "Ensure that the --audit-log-path argument is set (Automated)",
                                "status": "FAIL",
                                "remediation": "Set --audit-log-path to a suitable path and file where you would like audit logs to be written, for example --audit-log-path=/var/log/apiserver/audit.log"
                            }
                        ]
                    }
                ],
                "total_pass": 2,
                "total_fail": 3,
                "total_warn": 1,
                "total_info": 0
            },
            {
                "id": "4",
                "version": "cis-1.9",
                "detected_version": "1.29",
                "text": "Worker Node Security Configuration",
                "node_type": "node",
                "tests": [
                    {
                        "section": "4.1",
                        "desc": "Worker Node Configuration Files",
                        "results": [
                            {
                                "test_number": "4.1.1",
                                "test_desc": "Ensure that the kubelet service file permissions are set to 600 or more restrictive (Automated)",
                                "status": "PASS",
                                "remediation": "chmod 600 /etc/systemd/system/kubelet.service.d/10-kubeadm.conf"
                            },
                            {
                                "test_number": "4.1.2",
                                "test_desc": "Ensure that the kubelet service file ownership is set to root:root (Automated)",
                                "status": "PASS",
                                "remediation": "chown root:root /etc/systemd/system/kubelet.service.d/10-kubeadm.conf"
                            }
                        ]
                    },
                    {
                        "section": "4.2",
                        "desc": "Kubelet",
                        "results": [
                            {
                                "test_number": "4.2.1",
                                "test_desc": "Ensure that the --anonymous-auth argument is set to false (Automated)",
                                "status": "PASS",
                                "remediation": "Set authentication: anonymous: enabled to false in the kubelet config file"
                            },
                            {
                                "test_number": "4.2.6",
                                "test_desc": "Ensure that the --make-iptables-util-chains argument is set to true (Automated)",
                                "status": "WARN",
                                "remediation": "Set makeIPTablesUtilChains: true in the kubelet config file"
                            },
                            {
                                "test_number": "4.2.10",
                                "test_desc": "Ensure that the --rotate-certificates argument is not set to false (Automated)",
                                "status": "INFO",
                                "remediation": "Remove --rotate-certificates=false from KUBELET_CERTIFICATE_ARGS"
                            }
                        ]
                    }
                ],
                "total_pass": 3,
                "total_fail": 0,
                "total_warn": 1,
                "total_info": 1
            },
            {
                "id": "5",
                "version": "cis-1.9",
                "detected_version": "1.29",
                "text": "Kubernetes Policies",
                "node_type": "policies",
                "tests": [
                    {
                        "section": "5.1",
                        "desc": "RBAC and Service Accounts",
                        "results": [
                            {
                                "test_number": "5.1.1",
                                "test_desc": "Ensure that the cluster-admin role is only used where required (Manual)",
                                "status": "WARN",
                                "remediation": "Identify all clusterrolebindings to the cluster-admin role and remove those that are not required"
                            },
                            {
                                "test_number": "5.1.3",
                                "test_desc": "Minimize wildcard use in Roles and ClusterRoles (Manual)",
                                "status": "FAIL",
                                "remediation": "Where possible replace any use of wildcards in clusterroles and roles with specific objects or actions"
                            }
                        ]
                    }
                ],
                "total_pass": 0,
                "total_fail": 1,
                "total_warn": 1,
                "total_info": 0
            }
        ],
        "Totals": {
            "total_pass": 5,
            "total_fail": 4,
            "total_warn": 3,
            "total_info": 1
        }
    }))
}

// ============================================================================
// Tests
// ============================================================================
