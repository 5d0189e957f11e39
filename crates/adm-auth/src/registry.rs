//! 权限注册表：把 (method, route) 解析为权限码
//!
//! 匹配规则：
//! - 先按 `(METHOD, url)` 精确匹配；
//! - 否则尝试通配模式：`*` 或 `:name` 匹配一个路径段，末尾的 `**` 匹配剩余所有段；
//!   多个模式同时命中时取字面段最多者，其次段数最多者，仍相同则取先注册者；
//! - 已禁用或未绑定路由的条目不参与匹配，对应路由视为未注册。

use adm_core::{build_tree, ApiEntry};
use adm_error::{AdmError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{ApiInput, ApiTreeResponse};
use crate::permissions::{self, Permission};
use crate::store::ApiRepository;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Any,
}

#[derive(Debug)]
struct RoutePattern {
    method: String,
    segments: Vec<Segment>,
    /// 以 `**` 结尾
    tail: bool,
    code: String,
}

impl RoutePattern {
    fn parse(method: &str, url: &str, code: &str) -> Option<Self> {
        let mut parts: Vec<&str> = split_path(url).collect();
        let tail = parts.last() == Some(&"**");
        if tail {
            parts.pop();
        }
        let segments: Vec<Segment> = parts
            .iter()
            .map(|p| {
                if *p == "*" || p.starts_with(':') {
                    Segment::Any
                } else {
                    Segment::Literal((*p).to_string())
                }
            })
            .collect();
        if !tail && segments.iter().all(|s| matches!(s, Segment::Literal(_))) {
            return None;
        }
        Some(Self {
            method: method.to_string(),
            segments,
            tail,
            code: code.to_string(),
        })
    }

    fn specificity(&self) -> (usize, usize, bool) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        (literals, self.segments.len(), !self.tail)
    }

    fn matches(&self, method: &str, parts: &[&str]) -> bool {
        if self.method != method {
            return false;
        }
        if self.tail {
            if parts.len() < self.segments.len() {
                return false;
            }
        } else if parts.len() != self.segments.len() {
            return false;
        }
        self.segments.iter().zip(parts).all(|(seg, part)| match seg {
            Segment::Any => true,
            Segment::Literal(lit) => lit == part,
        })
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// 路由索引，由注册表全量构建
#[derive(Debug, Default)]
struct RouteIndex {
    exact: HashMap<(String, String), String>,
    patterns: Vec<RoutePattern>,
}

impl RouteIndex {
    fn build(entries: &[ApiEntry]) -> Self {
        let mut index = RouteIndex::default();
        for entry in entries {
            if !entry.status || entry.url.is_empty() || entry.method.is_empty() {
                continue;
            }
            let method = entry.method.to_ascii_uppercase();
            let key = (method.clone(), entry.url.clone());
            if let Some(existing) = index.exact.get(&key) {
                warn!(
                    method = %method,
                    url = %entry.url,
                    kept = %existing,
                    ignored = %entry.permission_code,
                    "duplicate route in permission registry"
                );
                continue;
            }
            index.exact.insert(key, entry.permission_code.clone());
            if let Some(pattern) = RoutePattern::parse(&method, &entry.url, &entry.permission_code)
            {
                index.patterns.push(pattern);
            }
        }
        // 稳定排序，同等具体程度保持注册顺序
        index
            .patterns
            .sort_by(|a, b| b.specificity().cmp(&a.specificity()));
        index
    }

    fn resolve(&self, method: &str, path: &str) -> Option<&str> {
        if let Some(code) = self.exact.get(&(method.to_string(), path.to_string())) {
            return Some(code);
        }
        let parts: Vec<&str> = split_path(path).collect();
        self.patterns
            .iter()
            .find(|p| p.matches(method, &parts))
            .map(|p| p.code.as_str())
    }
}

pub struct PermissionRegistry {
    apis: Arc<dyn ApiRepository>,
    cache: RwLock<Option<Arc<RouteIndex>>>,
    generation: AtomicU64,
}

impl PermissionRegistry {
    pub fn new(apis: Arc<dyn ApiRepository>) -> Self {
        Self {
            apis,
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    async fn index(&self) -> Result<Arc<RouteIndex>> {
        if let Some(index) = self.cache.read().await.as_ref() {
            return Ok(index.clone());
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let entries = self.apis.list_all().await?;
        let index = Arc::new(RouteIndex::build(&entries));

        let mut cache = self.cache.write().await;
        // 加载期间发生过修改则不写入缓存
        if self.generation.load(Ordering::SeqCst) == generation {
            *cache = Some(index.clone());
            debug!(
                exact = index.exact.len(),
                patterns = index.patterns.len(),
                "route index rebuilt"
            );
        }
        Ok(index)
    }

    /// 使路由缓存失效，注册表每次修改后调用
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.cache.write().await = None;
    }

    /// 解析请求对应的权限码，未注册返回 `NotFound`
    pub async fn resolve_code(&self, method: &str, path: &str) -> Result<String> {
        let method = method.to_ascii_uppercase();
        let index = self.index().await?;
        index
            .resolve(&method, path)
            .map(str::to_string)
            .ok_or_else(|| AdmError::NotFound {
                resource: format!("route {} {}", method, path),
            })
    }

    pub async fn api_tree(&self) -> Result<ApiTreeResponse> {
        let entries = self.apis.list_all().await?;
        let tree = build_tree(entries, 0)?;
        Ok(ApiTreeResponse {
            tree,
            method_map: permissions::method_map(),
            is_menu_map: permissions::is_menu_map(),
            status_map: permissions::status_map(),
        })
    }

    pub async fn get_api(&self, id: i64) -> Result<ApiEntry> {
        self.apis
            .get_by_id(id)
            .await?
            .ok_or_else(|| AdmError::NotFound {
                resource: format!("api {}", id),
            })
    }

    pub async fn create_api(&self, input: ApiInput) -> Result<ApiEntry> {
        let entry = input.into_entry(0)?;
        check_code(&entry.permission_code)?;
        if entry.parent_id != 0 {
            self.get_api(entry.parent_id).await?;
        }

        let created = self.apis.create(entry).await?;
        self.invalidate().await;
        info!(
            api_id = created.id,
            permission_code = %created.permission_code,
            "api registered"
        );
        Ok(created)
    }

    pub async fn update_api(&self, id: i64, input: ApiInput) -> Result<ApiEntry> {
        let entry = input.into_entry(id)?;
        check_code(&entry.permission_code)?;

        // 修改父节点前确认不会成环
        let mut entries = self.apis.list_all().await?;
        let Some(slot) = entries.iter_mut().find(|e| e.id == id) else {
            return Err(AdmError::NotFound {
                resource: format!("api {}", id),
            });
        };
        *slot = entry.clone();
        if entry.parent_id != 0 && !entries.iter().any(|e| e.id == entry.parent_id) {
            return Err(AdmError::NotFound {
                resource: format!("api {}", entry.parent_id),
            });
        }
        build_tree(entries, 0)?;

        let updated = self.apis.update(entry).await?;
        self.invalidate().await;
        info!(api_id = id, permission_code = %updated.permission_code, "api updated");
        Ok(updated)
    }

    pub async fn delete_api(&self, id: i64) -> Result<()> {
        self.apis.delete(id).await?;
        self.invalidate().await;
        info!(api_id = id, "api deleted");
        Ok(())
    }

    /// 写入内置接口，已存在的权限码跳过
    pub async fn seed_builtin(&self) -> Result<usize> {
        let existing = self.apis.list_all().await?;
        let mut created = 0;
        for (code, method, url) in Permission::builtin_routes() {
            if existing.iter().any(|e| e.permission_code == code) {
                continue;
            }
            self.apis
                .create(ApiEntry {
                    id: 0,
                    parent_id: 0,
                    name: code.to_string(),
                    permission_code: code.to_string(),
                    url: url.to_string(),
                    method: method.to_string(),
                    sort: 0,
                    status: true,
                    is_menu: false,
                    description: None,
                })
                .await?;
            created += 1;
        }
        if created > 0 {
            self.invalidate().await;
        }
        Ok(created)
    }
}

fn check_code(code: &str) -> Result<()> {
    if !Permission::is_valid_code(code) {
        return Err(AdmError::Validation {
            message: format!("权限码格式错误: {}", code),
        });
    }
    Ok(())
}
