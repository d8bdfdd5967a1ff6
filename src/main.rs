use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use violation_parse::config::{CliOverrides, ConfigLoader, ServiceConfig};
use violation_parse::forwarder::{HttpResultForwarder, ResultForwarder};
use violation_parse::plate::connect_remote_engines;
use violation_parse::{
    ChatReportDrafter, FfmpegOpener, ModelSet, ProcessOutcome, ProcessingRegistry, S3Client,
    ViolationAnalyzer, ViolationService,
};

/// 交通违章视频分析 - 违章判定与车牌识别
#[derive(Parser, Debug)]
#[command(name = "violation-parse")]
#[command(about = "交通违章视频分析：违章分类、车牌识别、结果转发", long_about = None)]
struct Args {
    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别（trace, debug, info, warn, error）
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 违章判定置信度下限 (0.0-1.0)
    #[arg(long, global = true)]
    min_confidence: Option<f32>,

    /// 报告中的地点
    #[arg(long, global = true)]
    location: Option<String>,

    /// 违章记录转发地址
    #[arg(long, global = true)]
    forward_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 分析本地视频并输出报告
    Analyze {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,
    },
    /// 处理一个远端视频（下载、分析、转发）
    Process {
        /// 对象存储中的视频键
        #[arg(short, long)]
        key: String,
    },
    /// Web 服务模式：接收 S3 上传通知
    Serve {
        /// 监听地址（默认从环境变量 SERVER_PORT 读取，如果不存在则使用 0.0.0.0:8000）
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// 生成默认配置文件
    InitConfig {
        #[arg(default_value = "violation-parse.ini")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Commands::InitConfig { path } = &args.command {
        ConfigLoader::create_default_config(path)?;
        println!("已生成配置文件: {}", path.display());
        return Ok(());
    }

    let overrides = CliOverrides {
        log_level: args.log_level.clone(),
        min_confidence: args.min_confidence,
        location: args.location.clone(),
        forward_url: args.forward_url.clone(),
    };
    let config = ConfigLoader::load(args.config.as_deref(), &overrides).context("加载配置失败")?;

    // 初始化日志
    let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    match args.command {
        Commands::Analyze { input } => {
            let analyzer = Arc::new(build_analyzer(&config).await?);
            let report = tokio::task::spawn_blocking(move || analyzer.analyze(&input))
                .await
                .context("分析任务异常退出")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Process { key } => {
            let service = build_service(&config).await?;
            let outcome = service.process(&key).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if let ProcessOutcome::Failed { reason } = outcome {
                anyhow::bail!("处理失败: {}", reason);
            }
        }
        Commands::Serve { bind } => {
            // 优先使用命令行参数，其次使用环境变量 SERVER_PORT，最后使用默认值 8000
            let bind_addr = bind.unwrap_or_else(|| {
                std::env::var("SERVER_PORT")
                    .map(|port| format!("0.0.0.0:{}", port))
                    .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            });
            let service = Arc::new(build_service(&config).await?);
            start_web_server(&bind_addr, service).await?;
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

async fn build_analyzer(config: &ServiceConfig) -> Result<ViolationAnalyzer> {
    let opener = Arc::new(FfmpegOpener::new()?);
    let models = ModelSet::load(&config.models, config.analysis.window_length);
    let engines = connect_remote_engines(&config.ocr).await?;
    Ok(ViolationAnalyzer::new(
        opener,
        models,
        engines,
        config.analysis.clone(),
    ))
}

async fn build_service(config: &ServiceConfig) -> Result<ViolationService> {
    let analyzer = Arc::new(build_analyzer(config).await?);
    let store = Arc::new(S3Client::from_env(&config.storage).context("创建 S3 客户端失败")?);
    let drafter = Arc::new(ChatReportDrafter::new(config.llm.clone())?);
    let forwarder: Option<Arc<dyn ResultForwarder>> = if config.forwarding.enabled {
        Some(Arc::new(HttpResultForwarder::new(
            config.forwarding.url.clone(),
            Duration::from_secs(config.forwarding.timeout_secs),
        )?))
    } else {
        info!("结果转发已关闭");
        None
    };

    Ok(ViolationService::new(
        analyzer,
        store,
        drafter,
        forwarder,
        ProcessingRegistry::new(),
        &config.storage,
    ))
}

async fn start_web_server(bind: &str, service: Arc<ViolationService>) -> Result<()> {
    use axum::{
        routing::{get, post},
        Router,
    };
    use tower_http::cors::CorsLayer;
    use violation_parse::handler::{self, AppState};

    let app = Router::new()
        .route("/", get(handler::root))
        .route("/health", get(handler::health_check))
        // S3 上传通知
        .route("/s3-webhook", post(handler::handle_s3_webhook))
        // 直接分析服务器本地文件
        .route("/api/analyze", post(handler::handle_analyze))
        .layer(CorsLayer::permissive())
        .with_state(AppState { service });

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("可用端点:");
    tracing::info!("  • 服务状态: GET  http://{}/", bind);
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • S3 通知:  POST http://{}/s3-webhook", bind);
    tracing::info!("  • 本地分析: POST http://{}/api/analyze", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app)
        .await
        .context("启动服务器失败")?;

    Ok(())
}
