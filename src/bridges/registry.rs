use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::{debug, info, warn};

use super::traits::{BridgeBackend, BridgeError, BridgeResult, ErrorKind};

/// Lazily invoked constructor for a backend
pub type BackendFactory = Arc<dyn Fn() -> BridgeResult<Arc<dyn BridgeBackend>> + Send + Sync>;

/// 브리지 백엔드 레지스트리
///
/// 프로세스 시작 시 한 번 생성되어 오케스트레이터와 테스트에 핸들로 전달됩니다.
/// - 이미 생성된 인스턴스 등록 (`register`)
/// - 첫 조회 시 생성되는 팩토리 등록 (`register_factory`)
/// - 관리자용 비활성화/활성화
#[derive(Default)]
pub struct BackendRegistry {
    /// 생성 완료된 백엔드
    instances: DashMap<String, Arc<dyn BridgeBackend>>,

    /// 아직 생성되지 않은 백엔드 팩토리
    factories: DashMap<String, BackendFactory>,

    /// 관리자가 비활성화한 백엔드
    disabled: DashSet<String>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .field("disabled", &self.disabled.iter().map(|n| n.key().clone()).collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 생성된 백엔드 인스턴스 등록 (같은 이름이면 교체)
    pub fn register(&self, name: impl Into<String>, backend: Arc<dyn BridgeBackend>) {
        let name = name.into();
        self.factories.remove(&name);
        self.instances.insert(name.clone(), backend);
        info!("🔌 브리지 백엔드 등록: {}", name);
    }

    /// 첫 조회 시 실행되는 팩토리 등록
    pub fn register_factory(&self, name: impl Into<String>, factory: BackendFactory) {
        let name = name.into();
        self.instances.remove(&name);
        self.factories.insert(name.clone(), factory);
        debug!("Registered lazy backend factory: {}", name);
    }

    /// 백엔드 조회. 팩토리만 있으면 여기서 생성합니다.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn BridgeBackend>> {
        match self.resolve(name) {
            Ok(backend) => Some(backend),
            Err(e) if e.kind == ErrorKind::InitializationFailed => {
                warn!("⚠️ 백엔드 초기화 실패 {}: {}", name, e);
                None
            }
            Err(_) => None,
        }
    }

    /// 백엔드 조회 (오류 종류 포함)
    pub fn resolve(&self, name: &str) -> BridgeResult<Arc<dyn BridgeBackend>> {
        if self.disabled.contains(name) {
            return Err(BridgeError::unavailable(name));
        }

        if let Some(backend) = self.instances.get(name) {
            return Ok(Arc::clone(backend.value()));
        }

        let factory = self
            .factories
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| BridgeError::unavailable(name))?;

        let built = factory().map_err(|e| {
            BridgeError::new(
                ErrorKind::InitializationFailed,
                format!("Failed to initialize backend {}: {}", name, e.message),
            )
            .with_backend(name)
        })?;

        // 동시 조회 시 먼저 들어간 인스턴스를 사용
        let backend = self
            .instances
            .entry(name.to_string())
            .or_insert(built)
            .value()
            .clone();
        self.factories.remove(name);

        info!("🔌 브리지 백엔드 지연 초기화 완료: {}", name);
        Ok(backend)
    }

    /// 활성화된 모든 백엔드 (필요하면 생성). 초기화 실패한 백엔드는 제외됩니다.
    pub fn active_backends(&self) -> Vec<Arc<dyn BridgeBackend>> {
        self.names()
            .into_iter()
            .filter(|name| !self.disabled.contains(name))
            .filter_map(|name| self.lookup(&name))
            .collect()
    }

    /// 알려진 모든 백엔드 이름 (정렬됨)
    pub fn names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        names.extend(self.factories.iter().map(|e| e.key().clone()));
        names.into_iter().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name) || self.factories.contains_key(name)
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    /// 관리자용: 백엔드 라우팅 제외
    pub fn disable(&self, name: &str) -> bool {
        if !self.contains(name) {
            return false;
        }
        self.disabled.insert(name.to_string());
        warn!("🛑 브리지 백엔드 비활성화: {}", name);
        true
    }

    pub fn enable(&self, name: &str) -> bool {
        let removed = self.disabled.remove(name).is_some();
        if removed {
            info!("✅ 브리지 백엔드 재활성화: {}", name);
        }
        removed
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
