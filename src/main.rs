use clap::Parser;
use tracing_subscriber::EnvFilter;

use omni_glass::cli::{Args, Commands, PluginCommands};
use omni_glass::config::AppConfig;
use omni_glass::dispatch::{DispatchOutcome, ResultDispatcher};
use omni_glass::events::{EventsTx, PipelineEvent};
use omni_glass::host::Host;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut cfg = AppConfig::load(args.config_root.as_deref())?;
    if let Some(provider) = &args.provider {
        cfg.provider.active = provider.clone();
    }

    let (events, mut events_rx) = EventsTx::channel();
    let host = Host::new(cfg, None, events, ResultDispatcher::new())?;
    host.start().await;

    // Narrate pipeline events on stderr so stdout stays parseable.
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                PipelineEvent::ActionMenuSkeleton { skeleton, .. } => {
                    eprintln!("… {} — {}", skeleton.content_type, skeleton.summary);
                }
                PipelineEvent::RedactionApplied { counts, .. } => {
                    eprintln!("! sensitive data redacted: {counts:?}");
                }
                PipelineEvent::SessionFailed { phase, message, .. } => {
                    eprintln!("x failed in {phase}: {message}");
                }
                _ => {}
            }
        }
    });

    let exit = match run(&host, &args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };

    host.shutdown().await;
    printer.abort();
    std::process::exit(exit);
}

async fn run(host: &Host, args: &Args) -> anyhow::Result<i32> {
    match &args.command {
        Commands::Ask { text } => {
            let result = host.execute_text_command(text).await?;
            if let Some(menu) = &result.session.menu {
                eprintln!("{} — {}", menu.content_type, menu.summary);
            }
            match result.outcome {
                Some(DispatchOutcome::Text { markdown, .. }) => println!("{markdown}"),
                Some(DispatchOutcome::FileSaved { path }) => println!("saved: {path}"),
                Some(DispatchOutcome::CopiedToClipboard { chars }) => {
                    println!("copied {chars} chars")
                }
                Some(DispatchOutcome::NeedsConfirmation { command, rationale }) => {
                    if let Some(why) = rationale {
                        println!("{why}");
                    }
                    println!("proposed command (not run): {command}");
                }
                Some(DispatchOutcome::Error { message }) => {
                    eprintln!("{message}");
                    return Ok(1);
                }
                None => println!("no executable action suggested"),
            }
            Ok(0)
        }
        Commands::Plugins { command } => match command {
            PluginCommands::List => {
                for tool in host.registry().all_tools().await {
                    println!("{}:{}  {}", tool.plugin_id, tool.name, tool.description);
                }
                for pending in host.get_pending_approvals().await {
                    println!(
                        "pending: {} v{} (risk: {:?})",
                        pending.id, pending.version, pending.risk_level
                    );
                }
                Ok(0)
            }
            PluginCommands::Approve { plugin_id } => {
                host.approve_plugin(plugin_id, true).await?;
                println!("approved {plugin_id}");
                Ok(0)
            }
            PluginCommands::Deny { plugin_id } => {
                host.approve_plugin(plugin_id, false).await?;
                println!("denied {plugin_id}");
                Ok(0)
            }
        },
        Commands::TestProvider => {
            let report = host.test_provider().await?;
            println!("{report}");
            Ok(0)
        }
    }
}
