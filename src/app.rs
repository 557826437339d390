use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::info;
use tracing::warn;

use crate::bot;
use crate::bot::AppContext;
use crate::bot::Command;

pub struct App {
  bot: Bot,
  context: Arc<AppContext>,
  handler: UpdateHandler<anyhow::Error>,
}

impl App {
  pub fn new(bot: Bot, context: AppContext) -> Self {
    let context = Arc::new(context);
    let handler = bot::build_schema();
    Self { bot, context, handler }
  }

  pub async fn run(self) -> anyhow::Result<()> {
    let me = self.bot.get_me().await?;
    info!(username = me.username(), "connected to telegram");

    if let Err(err) = self.bot.set_my_commands(Command::bot_commands()).await {
      warn!(error = %err, "failed to register bot commands");
    }

    Dispatcher::builder(self.bot.clone(), self.handler)
      .dependencies(dptree::deps![self.context.clone(), me])
      .enable_ctrlc_handler()
      .build()
      .dispatch()
      .await;

    Ok(())
  }
}
