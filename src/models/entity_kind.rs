//! 登记组件中两类实体（企业、司机）的协议常量
//!
//! 字段键、方法名和选择器都是服务端下发的不透明值，只能原样使用

use serde_json::{json, Value as JsonValue};

/// 依赖关系：下游实体的查询要求上游实体已记录在快照的结果列表中
#[derive(Debug, Clone)]
pub struct Dependency {
    /// 上游实体类型名
    pub upstream: &'static str,
    /// 上游结果列表在数据袋中的键
    pub list_key: &'static str,
    /// 已选上游实体 id 所在的嵌套字段
    pub id_field: &'static str,
    /// 上游实体编码所在的嵌套字段
    pub code_field: &'static str,
}

/// 一类实体的"搜索 + 选择"协议描述
#[derive(Debug, Clone)]
pub struct EntityKind {
    /// 类型名，也用于结果文件名
    pub name: &'static str,
    /// 日志中显示的名称
    pub label: &'static str,
    pub search_input_id: &'static str,
    /// syncInput 写入的字段（`data.<键>`）
    pub search_field: &'static str,
    pub search_call_id: &'static str,
    pub search_method: &'static str,
    /// 搜索结果所在的数据袋键
    pub result_list: &'static str,
    pub select_call_id: &'static str,
    /// 通用分发方法的编码选择器
    pub selector: &'static str,
    /// 选择成功提示中应包含的词
    pub confirm_phrase: &'static str,
    /// 控制台摘要显示的字段 (键, 标签)
    pub summary_fields: &'static [(&'static str, &'static str)],
    pub dependency: Option<Dependency>,
}

/// 选择操作调用的通用分发方法
pub const DISPATCH_METHOD: &str = "__method";

const COMPANY_CODE_FIELD: &str = "cWFjL1BPYjFSMHBuMWkxbi9PZ0dxdz09";
const COMPANY_ID_FIELD: &str = "THd2VHJ1QzNOWDVoUjlBRGZaSzIrZz09";

impl EntityKind {
    /// 企业
    pub fn company() -> Self {
        Self {
            name: "company",
            label: "企业",
            search_input_id: "ohmu",
            search_field: "data.cWFjL1BPYjFSMHBuMWkxbi9PZ0dxdz09",
            search_call_id: "mvmr",
            search_method: "searchEmpresaCodigo",
            result_list: "empresas",
            select_call_id: "dpftk",
            selector: "LzN6OGVJbzFJNjBlSW5PRk9XOWVaQkMzNVZ0bGVrWmVzc3FlTmVnQzloVT0%3D",
            confirm_phrase: "seleccionada",
            summary_fields: &[
                ("codigo", "代码"),
                ("razon_social", "名称"),
                ("rif", "RIF"),
                ("tipo_ente", "类型"),
                ("nivel", "级别"),
            ],
            dependency: None,
        }
    }

    /// 司机（依赖已选企业）
    pub fn driver() -> Self {
        Self {
            name: "driver",
            label: "司机",
            search_input_id: "b3k7",
            search_field: "data.dFZpVGlDZU1rK2xmOE5GYTB2UTF2dz09",
            search_call_id: "2rps",
            search_method: "searchConductorCedula",
            result_list: "conductores",
            select_call_id: "zkm8",
            selector: "YTJnWEJUbmZ4UVR1NWtydHdXZWtGM1hxVGIwQ2xlTXVzNTlZcllCL0xVYz0%3D",
            confirm_phrase: "seleccionado",
            summary_fields: &[
                ("id", "ID"),
                ("cedula", "证件号"),
                ("nombre", "名"),
                ("apellido", "姓"),
            ],
            dependency: Some(Dependency {
                upstream: "company",
                list_key: "empresas",
                id_field: COMPANY_ID_FIELD,
                code_field: COMPANY_CODE_FIELD,
            }),
        }
    }
}

/// 服务端方法无条件访问的数据袋键及其默认值
#[derive(Debug, Clone)]
pub struct Completeness {
    defaults: Vec<(&'static str, JsonValue)>,
}

impl Completeness {
    pub fn new(defaults: Vec<(&'static str, JsonValue)>) -> Self {
        Self { defaults }
    }

    /// 调度登记组件需要的键
    pub fn registration() -> Self {
        Self::new(vec![
            ("empresas", json!([])),
            ("conductores", json!([])),
            ("vehiculos", json!([])),
            ("rubros_", json!([])),
            ("anios_cuspal", json!(["2021", "2022", "2023", "2024", "2025"])),
            (
                "meses_cuspal",
                json!([
                    "Enero", "Febrero", "Marzo", "Abril", "Mayo", "Junio", "Julio", "Agosto",
                    "Septiembre", "Octubre", "Noviembre", "Diciembre"
                ]),
            ),
        ])
    }

    pub fn defaults(&self) -> &[(&'static str, JsonValue)] {
        &self.defaults
    }
}
