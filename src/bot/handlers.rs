use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::InputFile;
use teloxide::types::KeyboardButton;
use teloxide::types::KeyboardMarkup;
use teloxide::types::Message;
use teloxide::types::MessageId;
use teloxide::types::ParseMode;
use teloxide::types::ReplyMarkup;
use teloxide::types::User;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::Command;
use crate::bot::HandlerResult;
use crate::bot::action::Action;
use crate::bot::action::MenuCommand;
use crate::bot::context::AppContext;
use crate::bot::controller::Inbound;
use crate::bot::controller::Visitor;
use crate::bot::controller::dispatch;
use crate::bot::render::Button;
use crate::bot::render::Content;
use crate::bot::render::Delivery;
use crate::bot::render::Markup;
use crate::bot::render::Reply;
use crate::bot::render::Target;

type SharedContext = Arc<AppContext>;

const STALE_BUTTON: &str = "This button is no longer supported.";
const DELIVERY_FAILED: &str = "Something went wrong, please try again.";

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  let message_handler = Update::filter_message()
    .branch(command_branch())
    .branch(dptree::endpoint(handle_text));

  let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

  dptree::entry().branch(message_handler).branch(callback_handler)
}

fn command_branch() -> UpdateHandler<anyhow::Error> {
  dptree::entry()
    .filter_command::<Command>()
    .branch(dptree::case![Command::Start].endpoint(handle_start))
    .branch(dptree::case![Command::Balance].endpoint(handle_balance))
    .branch(dptree::case![Command::Help].endpoint(handle_help))
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_start(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  let username = user.username.as_deref().unwrap_or("-");
  info!(user_id = user.id.0, chat_id = %msg.chat.id, username, "received /start command");
  respond(&bot, &ctx, &msg, Inbound::Start).await
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_balance(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /balance command");
  respond(&bot, &ctx, &msg, Inbound::BalanceCommand).await
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_help(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /help command");
  respond(&bot, &ctx, &msg, Inbound::HelpCommand).await
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_text(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  let Some(text) = msg.text() else {
    debug!(chat_id = %msg.chat.id, "ignoring non-text message");
    return Ok(());
  };
  respond(&bot, &ctx, &msg, Inbound::Text(text.to_string())).await
}

async fn respond(bot: &Bot, ctx: &AppContext, msg: &Message, inbound: Inbound) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  let outcome = dispatch(ctx, &visitor_from(user), inbound).await;
  deliver(bot, msg.chat.id, None, outcome.replies).await
}

#[instrument(skip(bot, ctx, query), fields(user_id = query.from.id.0))]
async fn handle_callback_query(bot: Bot, ctx: SharedContext, query: CallbackQuery) -> HandlerResult {
  let origin = query.message.as_ref().map(|message| (message.chat().id, message.id()));
  let chat = origin
    .map(|(chat, _)| chat)
    .unwrap_or_else(|| ChatId::from(query.from.id));
  let data = query.data.as_deref().unwrap_or_default();
  info!(chat_id = %chat, callback = data, "handling callback query");

  let action = match data.parse::<Action>() {
    Ok(action) => action,
    Err(err) => {
      warn!(callback = data, error = %err, "unsupported callback data");
      bot.answer_callback_query(query.id.clone()).text(STALE_BUTTON).await?;
      return Ok(());
    },
  };

  let outcome = dispatch(&ctx, &visitor_from(&query.from), Inbound::Action(action)).await;
  let delivered = deliver(&bot, chat, origin.map(|(_, message_id)| message_id), outcome.replies).await;

  let answer = bot.answer_callback_query(query.id);
  let answered = match callback_notice(outcome.notice, delivered.is_err()) {
    Some(text) => answer.text(text).await,
    None => answer.await,
  };
  delivered?;
  answered?;
  Ok(())
}

/// Toast for a handled tap. A failed delivery still answers the query so the
/// button stops spinning.
fn callback_notice(notice: Option<String>, delivery_failed: bool) -> Option<String> {
  if delivery_failed {
    return Some(DELIVERY_FAILED.to_string());
  }
  notice
}

fn visitor_from(user: &User) -> Visitor {
  Visitor {
    id: user.id.0 as i64,
    username: user.username.clone(),
    first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
    last_name: user.last_name.clone(),
  }
}

async fn deliver(bot: &Bot, chat: ChatId, origin: Option<MessageId>, replies: Vec<Reply>) -> HandlerResult {
  for reply in replies {
    deliver_one(bot, chat, origin, reply).await?;
  }
  Ok(())
}

/// Edits the tapped message in place when the reply allows it. Photos and the
/// reply keyboard cannot be attached by an edit, so those are always sent.
async fn deliver_one(bot: &Bot, chat: ChatId, origin: Option<MessageId>, reply: Reply) -> HandlerResult {
  if let (Delivery::Edit, Some(message_id), Content::Text(text)) = (reply.delivery, origin, &reply.content)
    && reply.markup != Markup::MainMenu
  {
    let mut request = bot
      .edit_message_text(chat, message_id, text.clone())
      .parse_mode(ParseMode::Html);
    if let Markup::Inline(rows) = &reply.markup {
      request = request.reply_markup(inline_keyboard(rows));
    }
    match request.await {
      Ok(_) => return Ok(()),
      Err(RequestError::Api(ApiError::MessageNotModified)) => {
        debug!(chat_id = %chat, message_id = %message_id, "message already current");
        return Ok(());
      },
      Err(err) => {
        warn!(chat_id = %chat, message_id = %message_id, error = %err, "edit failed, sending a new message");
      },
    }
  }
  send(bot, chat, reply).await
}

async fn send(bot: &Bot, chat: ChatId, reply: Reply) -> HandlerResult {
  let markup = reply_markup(&reply.markup);
  let text = match reply.content {
    Content::Text(text) => text,
    Content::Photo { url, caption } => match send_photo(bot, chat, &url, &caption, markup.clone()).await {
      Ok(()) => return Ok(()),
      Err(err) => {
        warn!(chat_id = %chat, url = %url, error = %err, "photo send failed, falling back to text");
        caption
      },
    },
  };

  let mut request = bot.send_message(chat, text).parse_mode(ParseMode::Html);
  if let Some(markup) = markup {
    request = request.reply_markup(markup);
  }
  request.await?;
  Ok(())
}

async fn send_photo(bot: &Bot, chat: ChatId, url: &str, caption: &str, markup: Option<ReplyMarkup>) -> Result<()> {
  let url = reqwest::Url::parse(url).with_context(|| format!("invalid photo url {url}"))?;
  let mut request = bot
    .send_photo(chat, InputFile::url(url))
    .caption(caption)
    .parse_mode(ParseMode::Html);
  if let Some(markup) = markup {
    request = request.reply_markup(markup);
  }
  request.await?;
  Ok(())
}

fn reply_markup(markup: &Markup) -> Option<ReplyMarkup> {
  match markup {
    Markup::Plain => None,
    Markup::Inline(rows) => Some(inline_keyboard(rows).into()),
    Markup::MainMenu => Some(main_menu_keyboard().into()),
  }
}

fn inline_keyboard(rows: &[Vec<Button>]) -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(
    rows
      .iter()
      .map(|row| row.iter().filter_map(inline_button).collect::<Vec<_>>()),
  )
}

fn inline_button(button: &Button) -> Option<InlineKeyboardButton> {
  match &button.target {
    Target::Callback(action) => Some(InlineKeyboardButton::callback(button.label.clone(), action.to_string())),
    Target::Url(raw) => match reqwest::Url::parse(raw) {
      Ok(url) => Some(InlineKeyboardButton::url(button.label.clone(), url)),
      Err(err) => {
        warn!(url = %raw, error = %err, "dropping button with invalid url");
        None
      },
    },
  }
}

fn main_menu_keyboard() -> KeyboardMarkup {
  KeyboardMarkup::new(MenuCommand::LAYOUT.iter().map(|row| {
    row
      .iter()
      .map(|command| KeyboardButton::new(command.label()))
      .collect::<Vec<_>>()
  }))
  .resize_keyboard()
}
