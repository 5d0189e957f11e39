/// 权限定义模块
/// 内置的权限码与接口树渲染时使用的静态映射
use std::collections::BTreeMap;

/// 权限码常量定义
pub struct Permission;

impl Permission {
    // 系统用户
    pub const SYS_USER_CREATE: &'static str = "sys:user:create";

    // 角色管理
    pub const SYS_ROLE_LIST: &'static str = "sys:role:list";
    pub const SYS_ROLE_DETAIL: &'static str = "sys:role:detail";
    pub const SYS_ROLE_CREATE: &'static str = "sys:role:create";
    pub const SYS_ROLE_UPDATE: &'static str = "sys:role:update";
    pub const SYS_ROLE_DELETE: &'static str = "sys:role:delete";

    // 接口管理
    pub const SYS_API_TREE: &'static str = "sys:api:tree";
    pub const SYS_API_CREATE: &'static str = "sys:api:create";
    pub const SYS_API_UPDATE: &'static str = "sys:api:update";
    pub const SYS_API_DELETE: &'static str = "sys:api:delete";

    // 部门
    pub const SYS_DEPARTMENT_TREE: &'static str = "sys:department:tree";
    pub const SYS_DEPARTMENT_CREATE: &'static str = "sys:department:create";
    pub const SYS_DEPARTMENT_UPDATE: &'static str = "sys:department:update";
    pub const SYS_DEPARTMENT_DELETE: &'static str = "sys:department:delete";

    /// 管理端自带接口的权限码与 (method, route)，用于初始化注册表。
    /// 业务接口通过 `/sys/api/create` 登记。
    pub fn builtin_routes() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            (Self::SYS_USER_CREATE, "POST", "/sys/user/create"),
            (Self::SYS_ROLE_LIST, "GET", "/sys/role/list"),
            (Self::SYS_ROLE_DETAIL, "GET", "/sys/role/detail/:id"),
            (Self::SYS_ROLE_CREATE, "POST", "/sys/role/create"),
            (Self::SYS_ROLE_UPDATE, "PUT", "/sys/role/update/:id"),
            (Self::SYS_ROLE_DELETE, "DELETE", "/sys/role/delete/:id"),
            (Self::SYS_API_TREE, "GET", "/sys/api/tree"),
            (Self::SYS_API_CREATE, "POST", "/sys/api/create"),
            (Self::SYS_API_UPDATE, "PUT", "/sys/api/update/:id"),
            (Self::SYS_API_DELETE, "DELETE", "/sys/api/delete/:id"),
            (Self::SYS_DEPARTMENT_TREE, "GET", "/sys/department/tree"),
            (Self::SYS_DEPARTMENT_CREATE, "POST", "/sys/department/create"),
            (Self::SYS_DEPARTMENT_UPDATE, "PUT", "/sys/department/update/:id"),
            (Self::SYS_DEPARTMENT_DELETE, "DELETE", "/sys/department/delete/:id"),
        ]
    }

    /// 检查权限码格式: 由冒号分隔的非空小写段，例如 `sys:user:delete`
    pub fn is_valid_code(code: &str) -> bool {
        let mut segments = 0;
        for segment in code.split(':') {
            if segment.is_empty()
                || !segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
            {
                return false;
            }
            segments += 1;
        }
        segments >= 2
    }
}

pub fn method_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("GET", "查询"),
        ("POST", "新增"),
        ("PUT", "修改"),
        ("PATCH", "部分修改"),
        ("DELETE", "删除"),
    ])
}

pub fn is_menu_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([("true", "菜单"), ("false", "接口")])
}

pub fn status_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([("true", "启用"), ("false", "禁用")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_codes_unique_and_valid() {
        let routes = Permission::builtin_routes();
        let codes: HashSet<_> = routes.iter().map(|(code, _, _)| *code).collect();
        assert_eq!(codes.len(), routes.len());
        assert!(routes.iter().all(|(code, _, _)| Permission::is_valid_code(code)));
    }

    #[test]
    fn test_code_format() {
        assert!(Permission::is_valid_code("cms:article:list"));
        assert!(!Permission::is_valid_code("cms"));
        assert!(!Permission::is_valid_code("cms::list"));
        assert!(!Permission::is_valid_code("Sys:User"));
    }

    #[test]
    fn test_lookup_maps_cover_builtin_methods() {
        let methods = method_map();
        for (_, method, _) in Permission::builtin_routes() {
            assert!(methods.contains_key(method), "{method}");
        }
    }
}
