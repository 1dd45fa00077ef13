//! Process wiring: builds the collaborators, injects them into the teloxide
//! dispatcher and restarts the dispatcher when the watchdog reports a lost
//! connection.

use crate::bot::handlers::{is_command_text, BotContext, Caller, Command};
use crate::bot::state::SessionRegistry;
use crate::bot::transport::{ChatTransport, TelegramTransport, TextFormat};
use crate::bot::views;
use crate::bot::watchdog::{run_watchdog, Liveness};
use crate::bot::{delivery::DeliveryPipeline, router::CallbackRouter, wizard::ImageWizard};
use crate::config::Settings;
use crate::llm::{LlmProvider, ModelHandle};
use crate::providers::{GoogleSpeech, GoogleTranslator, StabilityImageGenerator};
use crate::storage::{InMemoryResponseStore, R2Storage, ResponseStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs the bot until Ctrl-C.
///
/// # Errors
///
/// Returns an error when no language model backend can be built.
pub async fn run_bot(settings: Arc<Settings>) -> anyhow::Result<()> {
    let store = init_storage(&settings).await;

    let model = Arc::new(ModelHandle::from_settings(&settings)?);
    info!("Language model client initialized.");

    let bot = Bot::new(settings.telegram_token.clone());
    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(bot.clone()));
    let liveness = Arc::new(Liveness::new());
    let context = Arc::new(build_context(
        &settings,
        store,
        model,
        transport.clone(),
        liveness.clone(),
    ));

    let restart = Arc::new(Notify::new());
    let cancel = CancellationToken::new();
    let watchdog = tokio::spawn(run_watchdog(
        transport,
        liveness,
        restart.clone(),
        Duration::from_secs(settings.watchdog_interval_secs),
        cancel.clone(),
    ));

    loop {
        info!("Bot is running...");
        let mut dispatcher = Dispatcher::builder(bot.clone(), setup_handler())
            .dependencies(dptree::deps![context.clone()])
            .enable_ctrlc_handler()
            .build();

        let restart_requested = Arc::new(AtomicBool::new(false));
        let watcher = {
            let token = dispatcher.shutdown_token();
            let restart = restart.clone();
            let restart_requested = restart_requested.clone();
            tokio::spawn(async move {
                restart.notified().await;
                restart_requested.store(true, Ordering::SeqCst);
                match token.shutdown() {
                    Ok(stopped) => stopped.await,
                    Err(e) => warn!("Dispatcher was not running: {e}"),
                }
            })
        };

        dispatcher.dispatch().await;
        watcher.abort();

        if !restart_requested.load(Ordering::SeqCst) {
            break;
        }
        warn!("Restarting dispatcher after connection loss");
    }

    cancel.cancel();
    if let Err(e) = watchdog.await {
        error!("Watchdog task failed: {e}");
    }
    info!("Bot stopped.");
    Ok(())
}

async fn init_storage(settings: &Settings) -> Arc<dyn ResponseStore> {
    if !settings.r2_configured() {
        warn!("R2 is not configured, responses are kept in memory only.");
        return Arc::new(InMemoryResponseStore::new(settings.response_history_limit));
    }
    match R2Storage::new(settings).await {
        Ok(s) => {
            info!("R2 Storage initialized.");
            if let Err(e) = s.check_connection().await {
                error!("R2 Storage connection check returned error: {e}");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize R2 Storage: {e}. Falling back to memory.");
            Arc::new(InMemoryResponseStore::new(settings.response_history_limit))
        }
    }
}

fn build_context(
    settings: &Settings,
    store: Arc<dyn ResponseStore>,
    model: Arc<ModelHandle>,
    transport: Arc<dyn ChatTransport>,
    liveness: Arc<Liveness>,
) -> BotContext {
    let timeout = settings.http_timeout_secs;
    let translator = Arc::new(GoogleTranslator::new(timeout));
    let speech = Arc::new(GoogleSpeech::new(settings.artifacts_dir.clone(), timeout));
    let images = Arc::new(StabilityImageGenerator::new(
        settings.stability_api_key.clone(),
        settings.artifacts_dir.clone(),
        timeout,
    ));

    let delivery = Arc::new(DeliveryPipeline::new(
        store.clone(),
        transport.clone(),
        settings.max_message_length,
    ));
    let text_model: Arc<dyn LlmProvider> = model.clone();
    let router = Arc::new(CallbackRouter::new(
        store,
        text_model,
        translator.clone(),
        speech,
        transport.clone(),
        delivery.clone(),
    ));
    let wizard = Arc::new(ImageWizard::new(
        Arc::new(SessionRegistry::new()),
        transport.clone(),
        images,
    ));

    let allowed = settings.allowed_users();
    let admins = settings.admin_users();
    info!(
        allowed = allowed.len(),
        admins = admins.len(),
        "Access lists loaded"
    );

    BotContext {
        allowed,
        admins,
        persona: settings.persona_name.clone(),
        model,
        translator,
        transport,
        delivery,
        router,
        wizard,
        liveness,
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| {
                        msg.text().is_some_and(|text| !is_command_text(text))
                    })
                    .endpoint(handle_text),
                ),
        )
}

fn message_caller(msg: &Message) -> Caller {
    Caller {
        user_id: msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed()),
        chat_id: msg.chat.id.0,
        first_name: msg
            .from
            .as_ref()
            .map_or_else(String::new, |u| u.first_name.clone()),
    }
}

async fn report_failure(ctx: &BotContext, chat_id: i64, e: &anyhow::Error) {
    error!(chat_id, "Handler error: {e:#}");
    if let Err(e) = ctx
        .transport
        .send_text(chat_id, views::GENERIC_ERROR, TextFormat::Plain, None)
        .await
    {
        error!(chat_id, "Failed to send error notice: {e}");
    }
}

async fn handle_command(
    msg: Message,
    cmd: Command,
    ctx: Arc<BotContext>,
) -> Result<(), teloxide::RequestError> {
    let caller = message_caller(&msg);
    if let Err(e) = ctx.handle_command(&caller, cmd).await {
        report_failure(&ctx, caller.chat_id, &e).await;
    }
    respond(())
}

async fn handle_text(msg: Message, ctx: Arc<BotContext>) -> Result<(), teloxide::RequestError> {
    let caller = message_caller(&msg);
    let Some(text) = msg.text() else {
        return respond(());
    };
    if let Err(e) = Box::pin(ctx.handle_text(&caller, text)).await {
        report_failure(&ctx, caller.chat_id, &e).await;
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    ctx: Arc<BotContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {e}");
    }
    let user_id = q.from.id.0.cast_signed();
    let caller = Caller {
        user_id,
        chat_id: q
            .message
            .as_ref()
            .map_or(user_id, |m| m.chat().id.0),
        first_name: q.from.first_name.clone(),
    };
    let data = q.data.as_deref().unwrap_or_default();
    if let Err(e) = ctx.handle_callback(&caller, data).await {
        report_failure(&ctx, caller.chat_id, &e).await;
    }
    respond(())
}
