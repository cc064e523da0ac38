use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器；重复调用与测试并行安全
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("llm_gateway=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
