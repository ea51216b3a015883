//! Subcommand: `oleg serve` -- run the webhook server.
//!
//! Verifies the Telegram token, wires store, quota, settings, responder and
//! pipeline together, registers the webhook when a public URL is configured
//! and serves until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use oleg_adapters::{TelegramClient, TelegramConfig, WebhookOptions};
use oleg_agent::{
    ChatSender, CommandHandler, DecisionEngine, LiveSettings, LlmClient, LlmClientConfig,
    MentionDetector, Pipeline, PipelineParts, Responder, ResponderConfig,
};
use oleg_store::{QuotaTracker, SlidingWindowStore};
use oleg_web::{AppState, WebConfig, WebServer};

use crate::config::BotConfig;
use crate::helpers::init_tracing;

/// Run the bot until a shutdown signal arrives.
pub async fn cmd_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    // 1. Configuration and logging.
    let mut config = BotConfig::from_env().context("invalid configuration")?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    init_tracing(config.log_level(), config.environment.is_production());
    info!(
        environment = %config.environment,
        model = %config.openai_model,
        "starting Oleg"
    );

    // 2. Verify the token and learn who we are.
    let telegram = Arc::new(
        TelegramClient::new(TelegramConfig::new(&config.telegram_token))
            .context("failed to create Telegram client")?,
    );
    let me = telegram
        .get_me()
        .await
        .context("failed to verify TELEGRAM_BOT_TOKEN with getMe")?;
    let username = config.bot_username.clone().or_else(|| me.username.clone());
    info!(
        bot_id = me.id,
        username = username.as_deref().unwrap_or("-"),
        name = %me.first_name,
        "bot identity verified"
    );

    // 3. State.
    let store = Arc::new(SlidingWindowStore::new(config.store).context("invalid store sizing")?);
    let quota = Arc::new(QuotaTracker::default());
    let settings = LiveSettings::new(config.tunables).context("invalid tunables")?;

    // 4. LLM.
    let llm = LlmClient::new(LlmClientConfig::openai_compatible(
        &config.openai_api_key,
        &config.openai_model,
        &config.openai_base_url,
    ))
    .context("failed to create LLM client")?;
    let responder = Arc::new(Responder::new(
        Arc::new(llm),
        ResponderConfig {
            model: config.openai_model.clone(),
            timeout: config.llm_timeout,
            max_response_words: config.max_response_words,
            ..ResponderConfig::default()
        },
    ));

    // 5. Pipeline.
    let engine = DecisionEngine::default();
    let mut commands = CommandHandler::new(
        config.admin_user_ids.iter().copied(),
        settings.clone(),
        Arc::clone(&quota),
        Arc::clone(&store),
        Arc::clone(&responder),
        engine.react_heat_threshold(),
    );
    if let Some(name) = &username {
        commands = commands.with_bot_username(name.as_str());
    }
    let mentions = MentionDetector::new(username.as_deref(), &config.bot_aliases)
        .context("failed to build mention detector")?;

    let pipeline = Arc::new(Pipeline::new(PipelineParts {
        store: Arc::clone(&store),
        quota: Arc::clone(&quota),
        settings: settings.clone(),
        engine,
        responder,
        commands,
        sender: Arc::clone(&telegram) as Arc<dyn ChatSender>,
        mentions,
        bot_id: me.id,
    }));

    let state = AppState::new(pipeline, store, quota, settings)
        .with_webhook_secret(config.webhook_secret.clone())
        .with_bot_id(me.id)
        .with_chat_idle(config.chat_idle);

    // 6. Webhook registration.
    let registered = match config.webhook_endpoint() {
        Some(endpoint) => {
            let options = WebhookOptions {
                url: endpoint,
                secret_token: config.webhook_secret.clone(),
                drop_pending_updates: false,
            };
            register_webhook(&telegram, &options).await?;
            true
        }
        None => {
            warn!("no TELEGRAM_WEBHOOK_URL configured, the bot will not receive updates");
            false
        }
    };

    // 7. Serve.
    let server = WebServer::new(
        WebConfig {
            bind_addr: config.host.clone(),
            port: config.port,
        },
        state,
    );
    let served = server.start(shutdown_signal()).await;

    if registered {
        match telegram.delete_webhook(false).await {
            Ok(()) => info!("webhook unregistered"),
            Err(e) => warn!(error = %e, "failed to unregister webhook"),
        }
    }

    served.context("web server failed")?;
    info!("Oleg stopped");
    Ok(())
}

/// Register the webhook and confirm Telegram reports it back.
pub async fn register_webhook(telegram: &TelegramClient, options: &WebhookOptions) -> Result<()> {
    let endpoint = options.url.as_str();
    telegram
        .set_webhook(options)
        .await
        .with_context(|| format!("failed to register webhook {endpoint}"))?;

    let info = telegram
        .get_webhook_info()
        .await
        .context("failed to verify webhook registration")?;
    if info.url == endpoint {
        info!(
            url = %endpoint,
            pending_updates = info.pending_update_count,
            "webhook registered"
        );
    } else {
        error!(expected = %endpoint, actual = %info.url, "webhook registration mismatch");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
