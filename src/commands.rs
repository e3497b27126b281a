use std::sync::Arc;

use anyhow::Context as _;

use crate::aggregate::{self, VenueFilter};
use crate::app::message::channel;
use crate::app::presenter::{self, Presenter};
use crate::app::router::RequestRouter;
use crate::app::stdio;
use crate::app::view::SearchView;
use crate::cli::{ParseArgs, SearchArgs, ServeArgs};
use crate::config::PollOverrides;
use crate::driver::DriverConfig;
use crate::fixture::FixtureForm;
use crate::form::{BookingForm, CriteriaSelection};
use crate::parser;
use crate::table::ResultTable;

pub fn parse(args: ParseArgs) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(&args.html)
        .with_context(|| format!("read results table: {}", args.html.display()))?;
    let table = ResultTable::from_html(&html).context("read results table")?;
    let venues = parser::parse(&table).context("parse results table")?;

    let filters = if args.bookable_only {
        vec![VenueFilter::Bookable]
    } else {
        Vec::new()
    };
    let venues = aggregate::apply_filters(&venues, &filters);
    tracing::info!(venues = venues.len(), "parsed results table");

    let json = serde_json::to_string_pretty(&venues).context("serialize venues")?;
    println!("{json}");
    Ok(())
}

pub async fn search(args: SearchArgs) -> anyhow::Result<()> {
    let config = driver_config(args.poll.into())?;
    let form: Arc<dyn BookingForm> = Arc::new(FixtureForm::load(&args.fixture)?);

    let (requests_tx, requests_rx) = channel();
    let (responses_tx, responses_rx) = channel();
    let router = RequestRouter::attach(form, config, responses_tx)
        .await
        .context("attach to booking form")?;
    let routing = tokio::spawn(router.serve(requests_rx));

    let presenter = Presenter::new(SearchView::default().with_bookable_only(args.bookable_only));
    let selection = args.criteria.into_iter().collect::<CriteriaSelection>();
    let view = presenter::run_search_session(presenter, selection, requests_tx, responses_rx).await;
    let routed = routing.await.context("join router")?;

    let view = view?;
    routed.context("router")?;

    let report = view.report();
    if report.schedule.is_empty() {
        tracing::warn!("no venues matched");
    }
    let json = serde_json::to_string_pretty(&report).context("serialize search report")?;
    println!("{json}");
    Ok(())
}

pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = driver_config(args.poll.into())?;
    let form: Arc<dyn BookingForm> = Arc::new(FixtureForm::load(&args.fixture)?);

    let (responses_tx, responses_rx) = channel();
    let router = RequestRouter::attach(form, config, responses_tx)
        .await
        .context("attach to booking form")?;
    tracing::info!(fixture = %args.fixture.display(), "serving requests on stdin");

    stdio::serve(
        router,
        responses_rx,
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

fn driver_config(cli: PollOverrides) -> anyhow::Result<DriverConfig> {
    let overrides = cli.or(PollOverrides::from_env()?);
    let config = overrides.driver_config();
    tracing::debug!(?config, "driver config");
    Ok(config)
}
