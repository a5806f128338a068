//! One function per subcommand. Output goes to stdout; logs go to stderr.

use std::io::{self, BufRead as _, Write as _};

use anyhow::{Context as _, bail};
use homestead_core::{
  favorite::PropertySummary,
  identity::Identity,
  role::AdminStatus,
};
use homestead_store_sqlite::SqliteStore;

use crate::{Command, Context, Credentials, FavoritesCommand, Property, RolesCommand};

pub async fn run(ctx: &Context, store: &SqliteStore, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Signup(creds) => {
      let password = password_or_prompt(creds.password, "Password: ")?;
      let who = ctx.session().sign_up(&creds.email, &password).await?;
      println!("signed up and signed in as {}", who.email);
    }
    Command::Signin(creds) => {
      let password = password_or_prompt(creds.password, "Password: ")?;
      let who = ctx.session().sign_in(&creds.email, &password).await?;
      println!("signed in as {}", who.email);
    }
    Command::Signout => {
      if ctx.session().current_identity().is_none() {
        println!("not signed in");
      } else {
        ctx.session().sign_out().await;
        println!("signed out");
      }
    }
    Command::Whoami => whoami(ctx).await?,
    Command::Passwd { password } => {
      signed_in(ctx)?;
      let password = password_or_prompt(password, "New password: ")?;
      ctx.session().update_password(&password).await?;
      println!("password updated");
    }
    Command::Favorites(command) => favorites(ctx, command).await?,
    Command::Roles(command) => roles(ctx, store, command).await?,
  }
  Ok(())
}

fn signed_in(ctx: &Context) -> anyhow::Result<Identity> {
  ctx
    .session()
    .current_identity()
    .context("not signed in; run `homestead signin <email>` first")
}

async fn whoami(ctx: &Context) -> anyhow::Result<()> {
  let Some(session) = ctx.session().current_session() else {
    println!("not signed in");
    return Ok(());
  };
  println!("email:   {}", session.identity.email);
  println!("user id: {}", session.identity.user_id);
  println!("expires: {}", session.expires_at.to_rfc3339());
  let admin = match ctx.admin_status().await {
    AdminStatus::Granted => "yes",
    AdminStatus::Denied => "no",
    AdminStatus::Unknown => "unknown (role lookup failed)",
  };
  println!("admin:   {admin}");
  Ok(())
}

async fn favorites(ctx: &Context, command: FavoritesCommand) -> anyhow::Result<()> {
  signed_in(ctx)?;
  ctx.refresh_favorites().await.context("failed to load favorites")?;
  let manager = ctx.favorites();

  match command {
    FavoritesCommand::List { json } => {
      let entries = manager.list();
      if json {
        println!("{}", serde_json::to_string_pretty(&*entries)?);
      } else if entries.is_empty() {
        println!("no saved properties");
      } else {
        for entry in entries.iter() {
          println!(
            "{}\t{}\t{}\t{}\t{}",
            entry.property_id,
            entry.title.as_deref().unwrap_or("-"),
            entry.price.as_deref().unwrap_or("-"),
            entry.location.as_deref().unwrap_or("-"),
            entry.created_at.format("%Y-%m-%d %H:%M"),
          );
        }
      }
    }
    FavoritesCommand::Add(property) => {
      let summary = summary(property);
      manager.add(&summary).await?;
      println!("saved {}", summary.id);
    }
    FavoritesCommand::Remove { property_id } => {
      manager.remove(&property_id).await?;
      println!("removed {property_id}");
    }
    FavoritesCommand::Toggle(property) => {
      let summary = summary(property);
      if manager.toggle(&summary).await? {
        println!("saved {}", summary.id);
      } else {
        println!("removed {}", summary.id);
      }
    }
  }
  Ok(())
}

fn summary(p: Property) -> PropertySummary {
  PropertySummary {
    id:       p.property_id,
    title:    p.title,
    image:    p.image,
    price:    p.price,
    location: p.location,
  }
}

async fn roles(ctx: &Context, store: &SqliteStore, command: RolesCommand) -> anyhow::Result<()> {
  match command {
    RolesCommand::Show { email } => {
      let who = match email {
        Some(email) => lookup(store, &email).await?,
        None => signed_in(ctx)?,
      };
      let held = ctx.roles().roles(&who).await?;
      if held.is_empty() {
        println!("{} holds no roles", who.email);
        return Ok(());
      }
      let names: Vec<String> = held.iter().map(|r| r.role.to_string()).collect();
      println!("{}: {}", who.email, names.join(", "));
      if let Some(role) = ctx.roles().effective_role(&who).await? {
        println!("effective role: {role}");
      }
    }
    RolesCommand::Grant { email, role } => {
      let who = lookup(store, &email).await?;
      if ctx.roles().grant(who.user_id, role).await? {
        println!("granted {role} to {}", who.email);
      } else {
        println!("{} already holds {role}", who.email);
      }
    }
    RolesCommand::Revoke { email, role } => {
      let who = lookup(store, &email).await?;
      if ctx.roles().revoke(who.user_id, role).await? {
        println!("revoked {role} from {}", who.email);
      } else {
        println!("{} does not hold {role}", who.email);
      }
    }
  }
  Ok(())
}

async fn lookup(store: &SqliteStore, email: &str) -> anyhow::Result<Identity> {
  store
    .find_user(email)
    .await?
    .with_context(|| format!("no account with email {email:?}"))
}

/// Use `given`, or read one line from stdin after printing `prompt`.
fn password_or_prompt(given: Option<String>, prompt: &str) -> anyhow::Result<String> {
  if let Some(password) = given {
    return Ok(password);
  }
  eprint!("{prompt}");
  io::stderr().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  let password = line.trim_end_matches(['\n', '\r']).to_owned();
  if password.is_empty() {
    bail!("no password given");
  }
  Ok(password)
}
