use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tokio::signal;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridge_router::bridges::{BackendRegistry, BridgeBackend};
use bridge_router::common::{format_duration_ms, format_fee, format_percentage, short_id};
use bridge_router::config::Config;
use bridge_router::core::BridgeOrchestrator;
use bridge_router::mocks::SimulatedBackend;
use bridge_router::monitoring::{MetricsSource, MonitoringManager};
use bridge_router::strategies::StrategyKind;
use bridge_router::types::{ChainId, StatusSink, TransferRequest};

fn transfer_args(command: Command) -> Command {
    command
        .arg(Arg::new("from").long("from").value_name("CHAIN").required(true).help("출발 체인"))
        .arg(Arg::new("to").long("to").value_name("CHAIN").required(true).help("도착 체인"))
        .arg(
            Arg::new("source-address")
                .long("source-address")
                .value_name("ADDRESS")
                .required(true)
                .help("출발 주소"),
        )
        .arg(
            Arg::new("destination-address")
                .long("destination-address")
                .value_name("ADDRESS")
                .required(true)
                .help("도착 주소"),
        )
        .arg(Arg::new("amount").long("amount").value_name("AMOUNT").required(true).help("전송 금액"))
        .arg(Arg::new("asset").long("asset").value_name("SYMBOL").help("자산 심볼 (예: USDC)"))
}

fn cli() -> Command {
    Command::new("bridge_router")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🌉 크로스체인 브리지 라우터 - 헬스 기반 라우팅과 자동 폴백")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .global(true),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("적용된 설정을 TOML로 출력하고 종료")
                .action(ArgAction::SetTrue),
        )
        .subcommand(transfer_args(Command::new("routes").about("라우트 미리보기 (실행하지 않음)")))
        .subcommand(
            transfer_args(Command::new("bridge").about("전송 실행"))
                .arg(Arg::new("backend").long("backend").value_name("NAME").help("사용할 백엔드 지정"))
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .value_name("STRATEGY")
                        .help("강제 전략 (default, performance, reliability, cost, security)"),
                )
                .arg(
                    Arg::new("no-fallback")
                        .long("no-fallback")
                        .help("이 요청에 대해 폴백 비활성화")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("선택까지만 수행하고 실행하지 않음")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("health").about("백엔드 헬스 조회"))
        .subcommand(Command::new("serve").about("모니터링 API와 이상 징후 탐지 실행"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let matches = cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .context("config path is required")?;
    let config = Config::load(Path::new(config_path)).context("설정 로드 실패")?;

    if matches.get_flag("print-config") {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.monitoring.log_level.clone());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("📋 설정 로드 완료: {}", config_path);
    let orchestrator = Arc::new(build_orchestrator(&config)?);

    match matches.subcommand() {
        Some(("routes", sub)) => run_routes(&orchestrator, sub).await,
        Some(("bridge", sub)) => run_bridge(&orchestrator, sub).await,
        Some(("health", _)) => run_health(&orchestrator).await,
        Some(("serve", _)) => run_serve(orchestrator, config.monitoring.api_port).await,
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

fn build_orchestrator(config: &Config) -> Result<BridgeOrchestrator> {
    let registry = Arc::new(BackendRegistry::new());
    for profile in &config.backends {
        let profile = profile.clone();
        let name = profile.name.clone();
        registry.register_factory(
            name,
            Arc::new(move || Ok(Arc::new(SimulatedBackend::new(profile.clone())) as Arc<dyn BridgeBackend>)),
        );
    }
    info!("🔌 백엔드 {}개 등록: {:?}", registry.len(), registry.names());

    let settings = config.orchestrator_settings()?;
    Ok(BridgeOrchestrator::new(registry, settings))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("--{} is required", name))
}

fn transfer_request(matches: &ArgMatches) -> Result<TransferRequest> {
    let source = ChainId::from_str(required(matches, "from")?)?;
    let destination = ChainId::from_str(required(matches, "to")?)?;
    let mut request = TransferRequest::new(
        source,
        destination,
        required(matches, "source-address")?,
        required(matches, "destination-address")?,
        required(matches, "amount")?,
    );
    if let Some(asset) = matches.get_one::<String>("asset") {
        request = request.with_asset(asset);
    }
    Ok(request)
}

async fn run_routes(orchestrator: &BridgeOrchestrator, matches: &ArgMatches) -> Result<()> {
    let request = transfer_request(matches)?;
    orchestrator.validate_request(&request)?;

    let routes = orchestrator.estimate_all_routes(&request).await;
    if routes.is_empty() {
        warn!("⚠️ {} → {} 경로를 지원하는 백엔드가 없습니다", request.source_chain, request.destination_chain);
        return Ok(());
    }

    println!("{} → {} ({})", request.source_chain, request.destination_chain, request.amount);
    for route in &routes {
        println!(
            "{} {:<14} 성공률 {:>8}  소요 {:>8}  수수료 {:<14} {}",
            if route.recommended { "★" } else { " " },
            route.backend,
            format_percentage(route.success_rate()),
            format_duration_ms(route.estimated_time_ms() as f64),
            format_fee(route.estimate.fee, &route.estimate.fee_asset),
            route.reason
        );
    }
    Ok(())
}

async fn run_bridge(orchestrator: &BridgeOrchestrator, matches: &ArgMatches) -> Result<()> {
    let mut request = transfer_request(matches)?
        .with_fallback(!matches.get_flag("no-fallback"))
        .with_dry_run(matches.get_flag("dry-run"));
    if let Some(backend) = matches.get_one::<String>("backend") {
        request = request.with_backend(backend);
    }
    let strategy = matches
        .get_one::<String>("strategy")
        .map(|s| StrategyKind::from_str(s))
        .transpose()?;

    let (sink, mut events) = StatusSink::channel();
    let request = request.with_status_sink(sink);
    let transfer_id = request.transfer_id.clone();

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!(
                "[{}] {:<20} {}",
                short_id(&event.transfer_id),
                event.stage.as_str(),
                event.backend.unwrap_or_default()
            );
        }
    });

    info!("🚀 전송 시작 [{}]", transfer_id);
    let result = match strategy {
        Some(kind) => orchestrator.bridge_with_strategy(kind, request).await,
        None => orchestrator.bridge(request).await,
    };
    if timeout(Duration::from_secs(1), printer).await.is_err() {
        warn!("상태 이벤트 출력 대기 시간 초과");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        error!("❌ 전송 실패 [{}]: {}", transfer_id, result.error.as_deref().unwrap_or("unknown"));
        std::process::exit(1);
    }
    Ok(())
}

async fn run_health(orchestrator: &BridgeOrchestrator) -> Result<()> {
    let mut health: Vec<_> = orchestrator.get_system_health().await.into_values().collect();
    health.sort_by(|a, b| a.backend.cmp(&b.backend));

    for entry in &health {
        println!(
            "{} {:<14} 성공률 {:>8}  평균 {:>8}  연속 실패 {}",
            if entry.is_healthy() { "✅" } else { "❌" },
            entry.backend,
            format_percentage(entry.success_rate),
            format_duration_ms(entry.avg_completion_time_ms),
            entry.consecutive_failures
        );
    }
    Ok(())
}

async fn run_serve(orchestrator: Arc<BridgeOrchestrator>, port: u16) -> Result<()> {
    let detector = orchestrator.detector().clone();
    let source: Arc<dyn MetricsSource> = orchestrator.clone();
    detector.start(source).await?;

    let manager = MonitoringManager::new(Arc::clone(&orchestrator), port);
    manager.start().await?;

    match signal::ctrl_c().await {
        Ok(()) => warn!("🛑 종료 신호 수신됨, 안전하게 종료 중..."),
        Err(err) => error!("❌ 신호 처리 오류: {}", err),
    }
    detector.stop().await?;
    info!("✅ 브리지 라우터가 종료되었습니다.");
    Ok(())
}
