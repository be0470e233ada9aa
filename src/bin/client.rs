//! SREJ 클라이언트 (수신자)
//!
//! 서버에 파일을 요청하고 받은 데이터를 로컬 파일로 저장한다.
//!
//! 사용법:
//!   cargo run --release --bin srej-client -- <src> <dst> <window> <buffer> <error-rate> <host> <port>
//!
//! 예시:
//!   cargo run --release --bin srej-client -- big.bin copy.bin 10 1000 0.05 localhost 9000

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use srej::{receive_file, Config, Error, ReceiveRequest, TransferParams};

const USAGE: &str = r#"SREJ Client - Selective-Reject ARQ 파일 전송 클라이언트

사용법:
  srej-client <src> <dst> <window-size> <buffer-size> <error-rate> <host> <port> [OPTIONS]

인자:
  <src>            서버 측 원본 파일 경로 (최대 100바이트)
  <dst>            로컬 저장 경로
  <window-size>    윈도우 크기 (패킷 수, 1~229)
  <buffer-size>    패킷당 데이터 크기 (바이트, 400~1400)
  <error-rate>     송신 패킷 손실/손상 확률 (0 이상 1 미만)
  <host>           서버 호스트명 또는 주소
  <port>           서버 포트

옵션:
  --seed <N>       에러 주입 RNG 시드 (재현용)
  -h, --help       이 도움말 출력

로그 레벨은 RUST_LOG로 조정 (기본: info)
"#;

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("유효한 {} 아님: {}", what, value))
}

fn parse_args() -> Result<(Config, ReceiveRequest), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut positional = Vec::new();
    let mut seed = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" => {
                let value = args.get(i + 1).ok_or("--seed 값 필요")?;
                seed = Some(parse_number::<u64>(value, "시드")?);
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let [src, dst, window, buffer, rate, host, port] = <[String; 7]>::try_from(positional)
        .map_err(|args| format!("인자 7개 필요 ({}개 받음)", args.len()))?;

    let params = TransferParams::new(
        parse_number(&window, "윈도우 크기")?,
        parse_number(&buffer, "버퍼 크기")?,
    )
    .map_err(|e| e.to_string())?;

    let mut config = Config::lossy(parse_number(&rate, "에러율")?);
    config.seed = seed;
    config.validate().map_err(|e| e.to_string())?;

    let request = ReceiveRequest {
        src,
        dst: PathBuf::from(dst),
        params,
        host,
        port: parse_number(&port, "포트")?,
    };
    Ok((config, request))
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let (config, request) = match parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            return Ok(ExitCode::FAILURE);
        }
    };

    info!("SREJ Client starting...");
    info!("Server: {}:{}", request.host, request.port);
    info!(
        "Window: {} packets, buffer: {} bytes, error rate: {:.1}%",
        request.params.window_size,
        request.params.buffer_size,
        config.error_rate * 100.0
    );

    let dst = request.dst.clone();
    match receive_file(config, request).await {
        Ok(stats) => {
            info!("Saved to {}", dst.display());
            info!("{}", stats.summary());
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::FileNotFound(name)) => {
            error!("Error: file {} not found on server", name);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!("Transfer failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
