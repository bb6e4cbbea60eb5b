//! Sofabaton Card 主入口
//!
//! 连接 Home Assistant，启动状态同步，打开详情对话框，然后从标准输入读取命令。

use sofabaton_card_lib::commands::{self, ConsoleCommand, HELP};
use sofabaton_card_lib::AppState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("sofabaton_card=debug".parse()?))
        .init();

    info!("Starting Sofabaton Card v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new().await?;
    state.start_sync().await?;

    if let Err(e) = commands::execute(&state, ConsoleCommand::Open(None)).await {
        error!("Failed to open dialog: {}", e);
    }
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            break;
        }

        // 操作之后稍等片刻再显示，让对话框先处理完
        let show_after = !matches!(
            command,
            ConsoleCommand::Show
                | ConsoleCommand::Status
                | ConsoleCommand::PauseSync(_)
                | ConsoleCommand::Help
        );
        match commands::execute(&state, command).await {
            Ok(Some(output)) => println!("{}", output),
            Ok(None) => {}
            Err(e) => println!("error: {}", e),
        }
        if show_after {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if let Ok(Some(view)) = commands::execute(&state, ConsoleCommand::Show).await {
                println!("{}", view);
            }
        }
    }

    state.shutdown().await;
    info!("Sofabaton Card stopped");
    Ok(())
}
