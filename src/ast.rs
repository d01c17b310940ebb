use indexmap::IndexMap;
use tracing::debug;

/// 解析后的一个参数，例如 `v[cf_1][]=foo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: ParamKey,
    /// 已解码的值；没有 `=` 时为空串
    pub value: String,
}

/// 参数名及其下标序列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamKey {
    pub name: String,
    pub subscripts: Vec<Subscript>,
}

/// 方括号下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscript {
    /// `[name]`
    Index(String),
    /// `[]`，追加到列表
    Push,
}

/// 按约定分组后的查询参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub set_filter: bool,
    /// `f[]`：启用的过滤字段，按出现顺序
    pub fields: Vec<String>,
    /// `op[field]`
    pub operators: IndexMap<String, String>,
    /// `v[field][]`
    pub values: IndexMap<String, Vec<String>>,
    /// `field=<op><values>` 简写
    pub short_filters: IndexMap<String, String>,
    pub sort: Option<String>,
    pub group_by: Option<String>,
    /// `c[]`
    pub columns: Vec<String>,
    /// `t[]`
    pub totals: Vec<String>,
}

impl QueryParams {
    pub fn from_params(params: Vec<Param>) -> Self {
        use Subscript::{Index, Push};

        let mut out = QueryParams::default();
        for Param { key, value } in params {
            match (key.name.as_str(), key.subscripts.as_slice()) {
                ("set_filter", []) => out.set_filter = !value.is_empty() && value != "0",
                ("f", [Push]) => {
                    if !value.is_empty() {
                        out.fields.push(value);
                    }
                }
                ("op", [Index(field)]) => {
                    out.operators.insert(field.clone(), value);
                }
                ("v", [Index(field), Push]) | ("v", [Index(field)]) => {
                    out.values.entry(field.clone()).or_default().push(value);
                }
                ("sort", []) => out.sort = Some(value),
                ("group_by", []) => out.group_by = Some(value),
                ("c", [Push]) => {
                    if !value.is_empty() {
                        out.columns.push(value);
                    }
                }
                ("t", [Push]) => {
                    if !value.is_empty() {
                        out.totals.push(value);
                    }
                }
                (name, []) if !name.is_empty() => {
                    out.short_filters.insert(name.to_string(), value);
                }
                (name, _) => debug!(param = name, "ignoring unrecognized parameter"),
            }
        }
        // 显式字段列表时 `f[]=` 也要算作设置了过滤
        if out.fields.is_empty() && out.operators.is_empty() && !out.set_filter {
            return out;
        }
        out.set_filter = true;
        out
    }
}
