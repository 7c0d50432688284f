//! 내장 시나리오 카탈로그
//!
//! GCS 버킷 모듈과 AKS 클러스터 모듈을 위한 기본 시나리오입니다.
//! 모듈 변수 이름은 `bucket_name`/`cluster_name`, `location`, `storage_class`,
//! `versioning`, `website`, `labels`, `force_destroy`, `resource_group_name`,
//! `kubernetes_version`, `tags`를 따릅니다. AKS 모듈은 `kube_config`와
//! `azure_policy_enabled` 출력을 내야 합니다.

use std::collections::BTreeMap;
use std::path::Path;

use terraprobe_core::types::{Platform, SpecValue};
use terraprobe_verifier::client::Fixture;
use terraprobe_verifier::compare::Matcher;

use crate::scenario::{AssertionGroup, Check, Expect, Scenario};

/// AKS 카탈로그 기본 Kubernetes 버전
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.29";

fn map(entries: &[(&str, SpecValue)]) -> SpecValue {
    SpecValue::Map(
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn equals(value: &str) -> Matcher {
    Matcher::Equals(value.to_owned())
}

fn bucket_outputs() -> AssertionGroup {
    AssertionGroup::new(
        "outputs",
        vec![
            Check::output("bucket_name", equals("${id}")),
            Check::output("bucket_url", equals("gs://${id}")),
        ],
    )
}

/// GCS 버킷 시나리오
///
/// - `basic`: 기본 버킷 생성, destroy 이후 부재 확인
/// - `versioning`: 버전 관리 활성화
/// - `website`: 정적 웹사이트 설정
/// - `force-destroy`: 객체가 남아 있는 버킷의 삭제
/// - `invalid-storage-class`: 잘못된 스토리지 클래스는 apply가 실패해야 함
pub fn gcs(module_dir: &Path) -> Vec<Scenario> {
    let labels = map(&[
        ("environment", SpecValue::from("testing")),
        ("test_run_id", SpecValue::from("${id}")),
    ]);

    vec![
        Scenario::new("basic", Platform::Gcs, module_dir)
            .with_var("location", "US")
            .with_var("storage_class", "STANDARD")
            .with_var("versioning", map(&[("enabled", SpecValue::from(false))]))
            .with_var("labels", labels.clone())
            .with_group(bucket_outputs())
            .verify_destroyed(true),
        Scenario::new("versioning", Platform::Gcs, module_dir)
            .with_var("location", "US-WEST1")
            .with_var("storage_class", "NEARLINE")
            .with_var("versioning", map(&[("enabled", SpecValue::from(true))]))
            .with_var("labels", labels.clone())
            .with_group(AssertionGroup::new(
                "versioning",
                vec![Check::live("versioning", equals("true"))],
            )),
        Scenario::new("website", Platform::Gcs, module_dir)
            .with_var("location", "EUROPE-WEST2")
            .with_var("storage_class", "STANDARD")
            .with_var(
                "website",
                map(&[
                    ("main_page_suffix", SpecValue::from("index.html")),
                    ("not_found_page", SpecValue::from("404.html")),
                ]),
            )
            .with_var("uniform_bucket_level_access", true)
            .with_group(AssertionGroup::new(
                "website",
                vec![
                    Check::live("website.main_page_suffix", equals("index.html")),
                    Check::live("website.not_found_page", equals("404.html")),
                ],
            )),
        Scenario::new("force-destroy", Platform::Gcs, module_dir)
            .with_var("location", "US-CENTRAL1")
            .with_var("storage_class", "STANDARD")
            .with_var("force_destroy", true)
            .with_fixture(Fixture::UploadObject {
                name: "terraprobe/force-destroy.txt".to_owned(),
                content: "object left behind to exercise force_destroy".to_owned(),
                content_type: "text/plain".to_owned(),
            })
            .verify_destroyed(true),
        Scenario::new("invalid-storage-class", Platform::Gcs, module_dir)
            .with_var("location", "US")
            .with_var("storage_class", "NOT_A_STORAGE_CLASS")
            .expecting(Expect::ApplyFails)
            .verify_spec(false),
    ]
}

/// AKS 클러스터 시나리오
///
/// 하나의 클러스터에 대해 기본 상태, 네트워킹, RBAC, 모니터링, 보안, 노드 풀 그룹을 검증합니다.
pub fn aks(module_dir: &Path, resource_group: &str) -> Vec<Scenario> {
    let cluster = Scenario::new("cluster", Platform::Aks, module_dir)
        .with_var("resource_group_name", resource_group)
        .with_var("location", "eastus")
        .with_var("kubernetes_version", DEFAULT_KUBERNETES_VERSION)
        .with_var("dns_prefix", "${id}")
        .with_var("tags", map(&[("environment", SpecValue::from("testing"))]))
        .with_group(AssertionGroup::new(
            "cluster-basic",
            vec![
                Check::output("cluster_name", equals("${id}")),
                Check::output(
                    "kubernetes_version",
                    Matcher::VersionPrefix("${var.kubernetes_version}".to_owned()),
                ),
                Check::live("provisioning_state", equals("Succeeded")),
                Check::live("fqdn", Matcher::Present),
            ],
        ))
        .with_group(AssertionGroup::new(
            "networking",
            vec![
                Check::live("network.plugin", equals("azure")),
                Check::live(
                    "network.policy",
                    Matcher::OneOf(vec!["azure".to_owned(), "calico".to_owned()]),
                ),
                Check::live("network.service_cidr", Matcher::Present),
                Check::live("network.dns_service_ip", Matcher::Present),
            ],
        ))
        .with_group(AssertionGroup::new(
            "rbac",
            vec![
                Check::live("rbac.aad_managed", equals("true")),
                Check::live("rbac.azure_rbac", equals("true")),
                Check::live("identity.type", Matcher::Present),
                Check::live("disable_local_accounts", equals("true")),
            ],
        ))
        .with_group(AssertionGroup::new(
            "monitoring",
            vec![
                Check::live("addons.omsagent.enabled", equals("true")),
                Check::live("addons.omsagent.workspace", Matcher::Present),
            ],
        ))
        .with_group(AssertionGroup::new(
            "security",
            vec![
                Check::live("addons.azurepolicy.enabled", equals("true")),
                Check::live("addons.azurekeyvaultsecretsprovider.enabled", equals("true")),
                Check::live("defender.workspace", Matcher::Present),
                Check::output("azure_policy_enabled", equals("true")),
            ],
        ))
        .with_group(AssertionGroup::new(
            "node-pool",
            vec![
                Check::live("node_pools.count", Matcher::AtLeast(1.0)),
                Check::live("node_pools.0.vm_size", Matcher::Present),
                Check::live("node_pools.0.enable_auto_scaling", Matcher::Present),
                Check::live("node_pools.0.availability_zones.count", Matcher::AtLeast(2.0)),
                Check::live("node_pools.0.os_disk_size_gb", Matcher::AtLeast(100.0)),
                Check::live("node_pools.0.autoscale_bounds_valid", equals("true")),
            ],
        ))
        .with_group(AssertionGroup::new(
            "kubernetes-connectivity",
            vec![
                Check::output("kube_config", Matcher::Present),
                Check::cluster("kube-system/pods.count", Matcher::AtLeast(1.0)),
                Check::cluster("kube-system/pods.running", Matcher::Contains("coredns".to_owned())),
                Check::cluster(
                    "kube-system/pods.running",
                    Matcher::Contains("kube-proxy".to_owned()),
                ),
            ],
        ));

    vec![cluster]
}

/// 플랫폼의 내장 시나리오를 반환합니다. AKS는 리소스 그룹이 필요합니다.
pub fn builtin(platform: Platform, module_dir: &Path, resource_group: Option<&str>) -> Vec<Scenario> {
    match platform {
        Platform::Gcs => gcs(module_dir),
        Platform::Aks => aks(module_dir, resource_group.unwrap_or_default()),
    }
}
