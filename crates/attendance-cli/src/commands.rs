//! One function per subcommand.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, Utc};
use tracing::info;

use attendance_core::models::{
    AnalyticsPeriod, AnalyticsQuery, AttendanceStatus, PaymentMethod, PaymentStatus, Role,
};
use attendance_core::views::admin::{
    choice, AdminEventDetailAction, AdminEventDetailPage, AdminEventsAction, AdminEventsPage,
    AnalyticsAction, AnalyticsPage, CheckinAction, CheckinPage, DashboardPage, EventSort,
    EventStatusFilter, MembersAction, MembersPage, PaymentTab, PaymentsAction, PaymentsPage,
};
use attendance_core::views::member::{
    EventDetailAction, EventDetailPage, EventsAction, EventsFilter, EventsPage, HistoryAction,
    HistoryPage, HomePage, ProfileAction, ProfilePage, ReceiptsAction, ReceiptsPage,
};
use attendance_core::views::{Controller, Page};

use crate::context::AppContext;
use crate::output::Output;

/// `None` for "all" or an empty value, otherwise the parsed status.
fn status_filter<T>(value: Option<String>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .as_deref()
        .and_then(choice)
        .map(|s| s.parse::<T>().map_err(|e| anyhow!(e)))
        .transpose()
}

// ===== Session =====

pub async fn login(ctx: &mut AppContext, id: Option<String>, remember: bool) -> Result<()> {
    let saved = ctx.auth.load_saved_credentials();
    let login_id = match id
        .or_else(|| saved.as_ref().map(|s| s.login_id.clone()))
        .or_else(|| ctx.config.last_login_id.clone())
    {
        Some(id) => id,
        None => prompt("Login ID: ")?,
    };

    let saved_password = saved
        .filter(|s| s.login_id == login_id)
        .map(|s| s.password);
    let password = match saved_password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let session = ctx.auth.login(&login_id, &password, remember).await?;
    ctx.config.last_login_id = Some(login_id);
    ctx.config.save()?;

    println!(
        "Signed in as {} ({})",
        session.user_name.as_deref().unwrap_or("member"),
        session.role.label()
    );
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    eprint!("{}", label);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

pub async fn logout(ctx: &AppContext, forget: bool) -> Result<()> {
    ctx.auth.logout(forget).await?;
    println!("Signed out");
    Ok(())
}

pub fn whoami(ctx: &AppContext) -> Result<()> {
    ctx.require_login()?;
    let session = ctx
        .auth
        .user_info()
        .ok_or_else(|| anyhow!("Not signed in"))?;
    println!("Name:      {}", session.user_name.as_deref().unwrap_or("-"));
    println!("Member ID: {}", session.member_id.as_deref().unwrap_or("-"));
    println!("Role:      {}", session.role.label());
    if let Some(left) =
        session.time_until_expiry(Utc::now().timestamp_millis(), ctx.config.session_timeout_ms)
    {
        println!("Expires:   in {}h {}m", left.num_hours(), left.num_minutes() % 60);
    }
    println!("API:       {}", ctx.config.api_url);
    Ok(())
}

// ===== Member pages =====

pub async fn home(ctx: &AppContext, output: &Output) -> Result<()> {
    ctx.require_login()?;
    let mut page = Page::new();
    HomePage::new(ctx.api.clone()).load(&mut page).await;
    output.flush(&page)
}

pub async fn events(
    ctx: &AppContext,
    output: &Output,
    tab: EventsFilter,
    search: Option<String>,
    refresh: bool,
) -> Result<()> {
    ctx.require_login()?;
    let mut page = Page::new();
    let mut events = EventsPage::new(ctx.api.clone());
    events.load(&mut page).await;
    if refresh {
        events.dispatch(EventsAction::Refresh, &mut page).await;
    }
    events.dispatch(EventsAction::SetFilter(tab), &mut page).await;
    if let Some(query) = search {
        events.dispatch(EventsAction::Search(query), &mut page).await;
    }
    output.flush(&page)
}

pub async fn my_event(
    ctx: &AppContext,
    output: &Output,
    id: String,
    answer: Option<String>,
    notes: String,
    pay: Option<String>,
) -> Result<()> {
    ctx.require_login()?;
    let mut page = Page::new();
    let mut detail = EventDetailPage::new(ctx.api.clone(), id);
    detail.load(&mut page).await;

    if let Some(answer) = answer {
        let status: AttendanceStatus = answer.parse().map_err(|e: String| anyhow!(e))?;
        detail
            .dispatch(
                EventDetailAction::SubmitAttendance {
                    status,
                    notes: notes.clone(),
                },
                &mut page,
            )
            .await;
    }
    if let Some(method) = pay {
        detail
            .dispatch(
                EventDetailAction::SubmitPayment {
                    method: Some(PaymentMethod::from(method)),
                    notes,
                },
                &mut page,
            )
            .await;
    }
    output.flush(&page)
}

pub async fn history(
    ctx: &AppContext,
    output: &Output,
    year: Option<i32>,
    status: Option<String>,
    export: bool,
) -> Result<()> {
    ctx.require_login()?;
    let status = status_filter::<AttendanceStatus>(status)?;
    let mut page = Page::new();
    let mut history = HistoryPage::new(ctx.api.clone());
    history.load(&mut page).await;
    if let Some(year) = year {
        history.dispatch(HistoryAction::SetYear(year), &mut page).await;
    }
    history.dispatch(HistoryAction::SetStatus(status), &mut page).await;
    if export {
        history.dispatch(HistoryAction::Export, &mut page).await;
    }
    output.flush(&page)
}

pub async fn receipts(
    ctx: &AppContext,
    output: &Output,
    year: Option<i32>,
    status: Option<String>,
    receipt: Option<String>,
) -> Result<()> {
    ctx.require_login()?;
    let status = status_filter::<PaymentStatus>(status)?;
    let mut page = Page::new();
    let mut receipts = ReceiptsPage::new(ctx.api.clone());
    receipts.load(&mut page).await;
    if let Some(year) = year {
        receipts.dispatch(ReceiptsAction::SetYear(year), &mut page).await;
    }
    receipts.dispatch(ReceiptsAction::SetStatus(status), &mut page).await;
    if let Some(id) = receipt {
        receipts.dispatch(ReceiptsAction::ViewReceipt(id), &mut page).await;
    }
    output.flush(&page)
}

pub async fn profile(ctx: &AppContext, output: &Output, change_password: bool) -> Result<()> {
    ctx.require_login()?;
    let mut page = Page::new();
    let mut profile = ProfilePage::new(ctx.api.clone());
    profile.load(&mut page).await;
    if change_password {
        let current = rpassword::prompt_password("Current password: ")?;
        let new = rpassword::prompt_password("New password: ")?;
        let confirm = rpassword::prompt_password("Repeat new password: ")?;
        profile
            .dispatch(
                ProfileAction::ChangePassword {
                    current,
                    new,
                    confirm,
                },
                &mut page,
            )
            .await;
    }
    output.flush(&page)
}

// ===== Staff pages =====

pub async fn dashboard(ctx: &AppContext, output: &Output) -> Result<()> {
    ctx.require_admin()?;
    let mut page = Page::new();
    DashboardPage::new(ctx.api.clone()).load(&mut page).await;
    output.flush(&page)
}

pub struct AdminEventsArgs {
    pub status: EventStatusFilter,
    pub sort: EventSort,
    pub search: Option<String>,
    pub duplicate: Option<String>,
    pub delete: Option<String>,
}

pub async fn admin_events(ctx: &AppContext, output: &Output, args: AdminEventsArgs) -> Result<()> {
    ctx.require_admin()?;
    let mut page = Page::new();
    let mut events = AdminEventsPage::new(ctx.api.clone());
    events.load(&mut page).await;

    if let Some(id) = args.duplicate {
        events.dispatch(AdminEventsAction::Duplicate(id), &mut page).await;
    }
    if let Some(id) = args.delete {
        events.dispatch(AdminEventsAction::Delete(id), &mut page).await;
    }
    events.dispatch(AdminEventsAction::SetStatus(args.status), &mut page).await;
    events.dispatch(AdminEventsAction::SetSort(args.sort), &mut page).await;
    if let Some(query) = args.search {
        events.dispatch(AdminEventsAction::Search(query), &mut page).await;
    }
    output.flush(&page)
}

pub async fn event_roster(
    ctx: &AppContext,
    output: &Output,
    id: String,
    status: Option<String>,
    search: Option<String>,
    export: bool,
) -> Result<()> {
    ctx.require_admin()?;
    let status = status_filter::<AttendanceStatus>(status)?;
    let mut page = Page::new();
    let mut roster = AdminEventDetailPage::new(ctx.api.clone(), id);
    roster.load(&mut page).await;
    roster
        .dispatch(AdminEventDetailAction::SetStatus(status), &mut page)
        .await;
    if let Some(query) = search {
        roster
            .dispatch(AdminEventDetailAction::Search(query), &mut page)
            .await;
    }
    if export {
        roster.dispatch(AdminEventDetailAction::Export, &mut page).await;
    }
    output.flush(&page)
}

pub struct MembersArgs {
    pub role: Option<String>,
    pub affiliation: Option<String>,
    pub search: Option<String>,
    pub delete: Option<String>,
    pub show: Option<String>,
    /// Member ID and new role
    pub set_role: Option<(String, String)>,
    pub export: bool,
}

pub async fn members(ctx: &AppContext, output: &Output, args: MembersArgs) -> Result<()> {
    ctx.require_admin()?;
    let mut page = Page::new();
    let mut members = MembersPage::new(ctx.api.clone());
    members.load(&mut page).await;

    if let Some(id) = args.delete {
        members.dispatch(MembersAction::Delete(id), &mut page).await;
    }
    if let Some((id, role)) = args.set_role {
        let role = Role::from(role.trim().to_ascii_lowercase());
        members
            .dispatch(MembersAction::ChangeRole { id, role }, &mut page)
            .await;
    }
    if let Some(id) = args.show {
        members.dispatch(MembersAction::Edit(id), &mut page).await;
    }
    let role = args.role.as_deref().and_then(choice).map(Role::from);
    members.dispatch(MembersAction::SetRole(role), &mut page).await;
    let affiliation = args.affiliation.as_deref().and_then(choice);
    members
        .dispatch(MembersAction::SetAffiliation(affiliation), &mut page)
        .await;
    if let Some(query) = args.search {
        members.dispatch(MembersAction::Search(query), &mut page).await;
    }
    if args.export {
        members.dispatch(MembersAction::Export, &mut page).await;
    }
    output.flush(&page)
}

pub struct PaymentsArgs {
    pub tab: PaymentTab,
    pub event: Option<String>,
    pub member: Option<String>,
    pub method: Option<String>,
    pub confirm: Option<String>,
    pub receipt: Option<String>,
    pub export: bool,
}

pub async fn payments(ctx: &AppContext, output: &Output, args: PaymentsArgs) -> Result<()> {
    ctx.require_admin()?;
    let mut page = Page::new();
    let mut payments = PaymentsPage::new(ctx.api.clone());
    payments.load(&mut page).await;

    if let Some(id) = args.confirm {
        payments.dispatch(PaymentsAction::Confirm(id), &mut page).await;
    }
    if let Some(id) = args.receipt {
        payments.dispatch(PaymentsAction::IssueReceipt(id), &mut page).await;
    }
    payments.dispatch(PaymentsAction::SwitchTab(args.tab), &mut page).await;
    let event = args.event.as_deref().and_then(choice);
    payments.dispatch(PaymentsAction::SetEvent(event), &mut page).await;
    let method = args.method.as_deref().and_then(choice).map(PaymentMethod::from);
    payments.dispatch(PaymentsAction::SetMethod(method), &mut page).await;
    if let Some(query) = args.member {
        payments
            .dispatch(PaymentsAction::SearchMember(query), &mut page)
            .await;
    }
    if args.export {
        payments.dispatch(PaymentsAction::Export, &mut page).await;
    }
    output.flush(&page)
}

pub async fn checkin(
    ctx: &AppContext,
    output: &Output,
    event: String,
    member: Option<String>,
    paid: bool,
) -> Result<()> {
    ctx.require_admin()?;
    let mut page = Page::new();
    let mut checkin = CheckinPage::new(ctx.api.clone());
    checkin.load(&mut page).await;
    checkin
        .dispatch(CheckinAction::SelectEvent(Some(event)), &mut page)
        .await;

    if let Some(member_id) = member {
        checkin
            .dispatch(CheckinAction::Checkin(member_id.clone()), &mut page)
            .await;
        if checkin.awaiting_payment().is_some() {
            let action = if paid {
                CheckinAction::ConfirmPayment(member_id)
            } else {
                eprintln!("Payment outstanding. Pass --paid once the fee is collected.");
                CheckinAction::SkipPayment
            };
            checkin.dispatch(action, &mut page).await;
        }
    }
    output.flush(&page)
}

pub struct AnalyticsArgs {
    pub period: Option<AnalyticsPeriod>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub affiliation: Option<String>,
    pub position: Option<String>,
    pub tag: Option<String>,
    pub export: bool,
}

pub async fn analytics(ctx: &AppContext, output: &Output, args: AnalyticsArgs) -> Result<()> {
    ctx.require_admin()?;
    let mut page = Page::new();
    let base = AnalyticsPage::new(ctx.api.clone());
    let mut query = match args.period {
        Some(period) => AnalyticsQuery::for_period(period, Local::now().naive_local()),
        None => base.query().clone(),
    };
    if let Some(from) = args.from {
        query.start_date = from;
    }
    if let Some(to) = args.to {
        query.end_date = to;
    }
    query.affiliation = args.affiliation.as_deref().and_then(choice);
    query.position = args.position.as_deref().and_then(choice);
    query.tag = args.tag.as_deref().and_then(choice);

    let mut analytics = base.with_query(query);
    analytics.load(&mut page).await;
    if args.export {
        analytics.dispatch(AnalyticsAction::Export, &mut page).await;
    }
    output.flush(&page)
}

// ===== Cache =====

pub fn cache_stats(ctx: &AppContext) -> Result<()> {
    let stats = ctx.cache.stats()?;
    println!(
        "Entries: {} ({} valid, {} expired)",
        stats.total_keys, stats.valid_keys, stats.expired_keys
    );
    println!("Size:    {} KB", stats.total_size_kb);
    println!("TTL:     {} s", ctx.cache.default_ttl_ms() / 1000);
    Ok(())
}

pub fn cache_list(ctx: &AppContext) -> Result<()> {
    for entry in ctx.cache.entries()? {
        println!(
            "{:<40} {:>12}{}",
            entry.key,
            entry.age,
            if entry.expired { "  (expired)" } else { "" }
        );
    }
    Ok(())
}

pub fn cache_clear(ctx: &AppContext) -> Result<()> {
    ctx.cache.clear()?;
    info!("Cache cleared from the command line");
    println!("Cache cleared");
    Ok(())
}
