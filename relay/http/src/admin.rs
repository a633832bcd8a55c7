//! Admin/UI typed RPC surface
//!
//! One `axum` handler per operation, nested under `/api`, plus a bare
//! `/healthz` liveness probe outside that nest. Every endpoint/channel
//! mutation follows the same two-step shape: write through the relevant
//! persistence store, then call [`relay_catalog::Catalog::update_from_persistence`]
//! so the routing engine sees the change before the next reconciler tick.
//! There is no third way for a write to become visible.

mod private
{
  use crate::error::ApiError;
  use crate::port_manager::PortInfo;
  use crate::state::AppState;
  use axum::extract::{ Path, Query, State };
  use axum::routing::{ delete, get, post, put };
  use axum::Json;
  use axum::Router;
  use chrono::{ DateTime, Utc };
  use relay_catalog::CatalogEvent;
  use relay_persistence::{ NewChannel, NewEndpoint, RequestLogFilter };
  use relay_types::{ BusinessState, Channel, Endpoint, RelayError, RelayResult, RequestRecord, Setting, TokenCounters, UsageSummary };
  use serde::{ Deserialize, Serialize };
  use std::sync::Arc;

  // ---------------------------------------------------------------------
  // system status / port
  // ---------------------------------------------------------------------

  /// Per-channel rollup shown on the status page.
  #[ derive( Debug, Serialize ) ]
  struct ChannelStatus
  {
    name : String,
    participates_in_channel_failover : bool,
    endpoint_count : usize,
    healthy_count : usize,
  }

  /// `GET /api/status` response.
  #[ derive( Debug, Serialize ) ]
  struct StatusResponse
  {
    uptime_seconds : u64,
    active_requests : usize,
    channels : Vec< ChannelStatus >,
  }

  async fn get_status( State( state ) : State< Arc< AppState > > ) -> Json< StatusResponse >
  {
    let now = Utc::now();
    let uptime_seconds = u64::try_from( ( now - state.started_at ).num_seconds() ).unwrap_or( 0 );
    let health = state.health_registry();
    let cooldowns = state.cooldowns();

    let channels = state.catalog.current().channels.iter().map( | entry |
    {
      let healthy_count = entry.endpoints.iter()
        .filter( | endpoint | health.status( endpoint.id, &cooldowns, now ).is_eligible( now ) )
        .count();
      ChannelStatus
      {
        name : entry.channel.name.clone(),
        participates_in_channel_failover : entry.channel.participates_in_channel_failover,
        endpoint_count : entry.endpoints.len(),
        healthy_count,
      }
    } ).collect();

    Json( StatusResponse { uptime_seconds, active_requests : state.hot_pool.len(), channels } )
  }

  async fn get_port( State( state ) : State< Arc< AppState > > ) -> Json< PortInfo >
  {
    Json( state.port_info )
  }

  async fn healthz() -> &'static str
  {
    "ok"
  }

  // ---------------------------------------------------------------------
  // settings
  // ---------------------------------------------------------------------

  #[ derive( Debug, Deserialize ) ]
  struct SettingValueBody
  {
    value : String,
  }

  #[ derive( Debug, Deserialize ) ]
  struct SettingTriple
  {
    category : String,
    key : String,
    value : String,
  }

  #[ derive( Debug, Deserialize ) ]
  struct BatchSettingsBody
  {
    updates : Vec< SettingTriple >,
  }

  async fn list_settings( State( state ) : State< Arc< AppState > > ) -> Result< Json< Vec< Setting > >, ApiError >
  {
    Ok( Json( state.setting_store.list().await? ) )
  }

  async fn list_settings_by_category( State( state ) : State< Arc< AppState > >, Path( category ) : Path< String > ) -> Result< Json< Vec< Setting > >, ApiError >
  {
    Ok( Json( state.setting_store.list_by_category( &category ).await? ) )
  }

  async fn get_setting( State( state ) : State< Arc< AppState > >, Path( ( category, key ) ) : Path< ( String, String ) > ) -> Result< Json< Option< Setting > >, ApiError >
  {
    Ok( Json( state.setting_store.get( &category, &key ).await? ) )
  }

  async fn set_setting(
    State( state ) : State< Arc< AppState > >,
    Path( ( category, key ) ) : Path< ( String, String ) >,
    Json( body ) : Json< SettingValueBody >,
  ) -> Result< Json< Setting >, ApiError >
  {
    Ok( Json( state.settings.set( &category, &key, body.value ).await? ) )
  }

  async fn batch_set_settings( State( state ) : State< Arc< AppState > >, Json( body ) : Json< BatchSettingsBody > ) -> Result< Json< Vec< Setting > >, ApiError >
  {
    let updates = body.updates.into_iter().map( | triple | ( triple.category, triple.key, triple.value ) ).collect();
    Ok( Json( state.settings.update_and_apply( updates ).await? ) )
  }

  async fn reset_settings_category( State( state ) : State< Arc< AppState > >, Path( category ) : Path< String > ) -> Result< Json< Vec< Setting > >, ApiError >
  {
    Ok( Json( state.settings.reset_category( &category ).await? ) )
  }

  // ---------------------------------------------------------------------
  // endpoints
  // ---------------------------------------------------------------------

  async fn refresh_catalog( state : &AppState, event : CatalogEvent ) -> RelayResult< () >
  {
    state.catalog.update_from_persistence( &state.channel_store, &state.endpoint_store, event ).await
  }

  async fn list_endpoints( State( state ) : State< Arc< AppState > > ) -> Result< Json< Vec< Endpoint > >, ApiError >
  {
    Ok( Json( state.endpoint_store.list().await? ) )
  }

  async fn list_endpoints_by_channel( State( state ) : State< Arc< AppState > >, Path( channel ) : Path< String > ) -> Result< Json< Vec< Endpoint > >, ApiError >
  {
    Ok( Json( state.endpoint_store.list_by_channel( &channel ).await? ) )
  }

  async fn get_endpoint_by_id( State( state ) : State< Arc< AppState > >, Path( id ) : Path< i64 > ) -> Result< Json< Option< Endpoint > >, ApiError >
  {
    Ok( Json( state.endpoint_store.get( id ).await? ) )
  }

  async fn get_endpoint_by_name(
    State( state ) : State< Arc< AppState > >,
    Path( ( channel, name ) ) : Path< ( String, String ) >,
  ) -> Result< Json< Option< Endpoint > >, ApiError >
  {
    Ok( Json( state.endpoint_store.get_by_name( &channel, &name ).await? ) )
  }

  async fn create_endpoint( State( state ) : State< Arc< AppState > >, Json( new ) : Json< NewEndpoint > ) -> Result< Json< Endpoint >, ApiError >
  {
    let created = state.endpoint_store.create( new ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( created ) )
  }

  async fn update_endpoint_by_id(
    State( state ) : State< Arc< AppState > >,
    Path( id ) : Path< i64 >,
    Json( new ) : Json< NewEndpoint >,
  ) -> Result< Json< Endpoint >, ApiError >
  {
    let updated = state.endpoint_store.update( id, new ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( updated ) )
  }

  async fn update_endpoint_by_name(
    State( state ) : State< Arc< AppState > >,
    Path( ( channel, name ) ) : Path< ( String, String ) >,
    Json( new ) : Json< NewEndpoint >,
  ) -> Result< Json< Endpoint >, ApiError >
  {
    let existing = state.endpoint_store.get_by_name( &channel, &name ).await?
      .ok_or_else( || RelayError::ConfigInvalid { detail : format!( "endpoint {channel}/{name} does not exist" ) } )?;
    let updated = state.endpoint_store.update( existing.id, new ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( updated ) )
  }

  async fn delete_endpoint_by_id( State( state ) : State< Arc< AppState > >, Path( id ) : Path< i64 > ) -> Result< Json< () >, ApiError >
  {
    state.endpoint_store.delete( id ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( () ) )
  }

  async fn delete_endpoint_by_name(
    State( state ) : State< Arc< AppState > >,
    Path( ( channel, name ) ) : Path< ( String, String ) >,
  ) -> Result< Json< () >, ApiError >
  {
    if let Some( existing ) = state.endpoint_store.get_by_name( &channel, &name ).await?
    {
      state.endpoint_store.delete( existing.id ).await?;
      refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    }
    Ok( Json( () ) )
  }

  #[ derive( Debug, Deserialize ) ]
  struct EnableBody
  {
    enabled : bool,
  }

  async fn toggle_endpoint_enabled(
    State( state ) : State< Arc< AppState > >,
    Path( id ) : Path< i64 >,
    Json( body ) : Json< EnableBody >,
  ) -> Result< Json< Endpoint >, ApiError >
  {
    let existing = state.endpoint_store.get( id ).await?
      .ok_or_else( || RelayError::ConfigInvalid { detail : format!( "endpoint {id} does not exist" ) } )?;
    let new = endpoint_to_new( &existing, Some( body.enabled ), None );
    let updated = state.endpoint_store.update( id, new ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( updated ) )
  }

  #[ derive( Debug, Deserialize ) ]
  struct FailoverBody
  {
    participates_in_failover : bool,
  }

  async fn set_endpoint_failover(
    State( state ) : State< Arc< AppState > >,
    Path( id ) : Path< i64 >,
    Json( body ) : Json< FailoverBody >,
  ) -> Result< Json< Endpoint >, ApiError >
  {
    let existing = state.endpoint_store.get( id ).await?
      .ok_or_else( || RelayError::ConfigInvalid { detail : format!( "endpoint {id} does not exist" ) } )?;
    let new = endpoint_to_new( &existing, None, Some( body.participates_in_failover ) );
    let updated = state.endpoint_store.update( id, new ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( updated ) )
  }

  /// Project an [`Endpoint`] back into the write-DTO the store expects,
  /// optionally overriding `enabled`/`participates_in_failover` — the two
  /// fields the toggle endpoints flip without disturbing anything else.
  fn endpoint_to_new( endpoint : &Endpoint, enabled : Option< bool >, participates_in_failover : Option< bool > ) -> NewEndpoint
  {
    NewEndpoint
    {
      channel : endpoint.channel.clone(),
      name : endpoint.name.clone(),
      url : endpoint.url.clone(),
      bearer_token : endpoint.bearer_token.clone(),
      api_key : endpoint.api_key.clone(),
      custom_headers : endpoint.custom_headers.clone(),
      priority : endpoint.priority,
      participates_in_failover : participates_in_failover.unwrap_or( endpoint.participates_in_failover ),
      cooldown_seconds : endpoint.cooldown_seconds,
      timeout_seconds : endpoint.timeout_seconds,
      supports_token_counting : endpoint.supports_token_counting,
      cost_multiplier_overall : endpoint.cost_multiplier_overall,
      cost_multiplier_input : endpoint.cost_multiplier_input,
      cost_multiplier_output : endpoint.cost_multiplier_output,
      cost_multiplier_cache_creation_5m : endpoint.cost_multiplier_cache_creation_5m,
      cost_multiplier_cache_creation_1h : endpoint.cost_multiplier_cache_creation_1h,
      cost_multiplier_cache_read : endpoint.cost_multiplier_cache_read,
      enabled : enabled.unwrap_or( endpoint.enabled ),
    }
  }

  // ---------------------------------------------------------------------
  // channels
  // ---------------------------------------------------------------------

  async fn list_channels( State( state ) : State< Arc< AppState > > ) -> Result< Json< Vec< Channel > >, ApiError >
  {
    Ok( Json( state.channel_store.list().await? ) )
  }

  async fn create_channel( State( state ) : State< Arc< AppState > >, Json( new ) : Json< NewChannel > ) -> Result< Json< Channel >, ApiError >
  {
    let created = state.channel_store.create( new ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( created ) )
  }

  async fn update_channel(
    State( state ) : State< Arc< AppState > >,
    Path( id ) : Path< i64 >,
    Json( new ) : Json< NewChannel >,
  ) -> Result< Json< Channel >, ApiError >
  {
    let updated = state.channel_store.update( id, new ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( updated ) )
  }

  #[ derive( Debug, Deserialize ) ]
  struct DeleteChannelQuery
  {
    #[ serde( default ) ]
    cascade : bool,
  }

  /// Delete a channel, optionally cascading to its endpoints first.
  /// [`relay_persistence::ChannelStore::delete`] deliberately does not
  /// cascade on its own — that choice is this handler's to make.
  async fn delete_channel(
    State( state ) : State< Arc< AppState > >,
    Path( id ) : Path< i64 >,
    Query( query ) : Query< DeleteChannelQuery >,
  ) -> Result< Json< () >, ApiError >
  {
    if query.cascade
    {
      if let Some( channel ) = state.channel_store.get( id ).await?
      {
        let ids : Vec< i64 > = state.endpoint_store.list_by_channel( &channel.name ).await?
          .into_iter().map( | endpoint | endpoint.id ).collect();
        if !ids.is_empty()
        {
          state.endpoint_store.batch_delete( ids ).await?;
        }
      }
    }
    state.channel_store.delete( id ).await?;
    refresh_catalog( &state, CatalogEvent::Mutated ).await?;
    Ok( Json( () ) )
  }

  // ---------------------------------------------------------------------
  // group operations
  // ---------------------------------------------------------------------

  /// Flip a channel's `participates_in_channel_failover` flag. This is the
  /// only lever available to "activate"/"pause"/"resume" : a channel mid
  /// cooldown keeps cooling on its own schedule, since
  /// [`relay_health::CooldownRegistry`] has no early-clear operation — these
  /// group operations govern eligibility going forward, not in-flight
  /// cooldowns.
  async fn set_channel_participation( state : &AppState, name : &str, participates : bool ) -> RelayResult< Channel >
  {
    let existing = state.channel_store.get_by_name( name ).await?
      .ok_or_else( || RelayError::ConfigInvalid { detail : format!( "channel {name} does not exist" ) } )?;
    let new = NewChannel
    {
      name : existing.name.clone(),
      website : existing.website.clone(),
      priority : existing.priority,
      participates_in_channel_failover : participates,
    };
    let updated = state.channel_store.update( existing.id, new ).await?;
    refresh_catalog( state, CatalogEvent::Mutated ).await?;
    Ok( updated )
  }

  async fn activate_channel( State( state ) : State< Arc< AppState > >, Path( name ) : Path< String > ) -> Result< Json< Channel >, ApiError >
  {
    Ok( Json( set_channel_participation( &state, &name, true ).await? ) )
  }

  async fn pause_channel( State( state ) : State< Arc< AppState > >, Path( name ) : Path< String > ) -> Result< Json< Channel >, ApiError >
  {
    Ok( Json( set_channel_participation( &state, &name, false ).await? ) )
  }

  async fn resume_channel( State( state ) : State< Arc< AppState > >, Path( name ) : Path< String > ) -> Result< Json< Channel >, ApiError >
  {
    Ok( Json( set_channel_participation( &state, &name, true ).await? ) )
  }

  // ---------------------------------------------------------------------
  // request queries
  // ---------------------------------------------------------------------

  /// Query parameters for `GET /api/requests`. `group` is accepted as an
  /// alias for `channel` — the admin surface exposes one "group" concept
  /// to callers, but [`RequestLogFilter`] only ever filters on `channel`.
  #[ derive( Debug, Deserialize ) ]
  struct RequestQuery
  {
    start_time : Option< DateTime< Utc > >,
    end_time : Option< DateTime< Utc > >,
    state : Option< String >,
    model : Option< String >,
    channel : Option< String >,
    group : Option< String >,
    endpoint_name : Option< String >,
    limit : Option< u32 >,
    offset : Option< u32 >,
  }

  fn parse_business_state( raw : &str ) -> RelayResult< BusinessState >
  {
    match raw
    {
      "pending" => Ok( BusinessState::Pending ),
      "forwarding" => Ok( BusinessState::Forwarding ),
      "streaming" => Ok( BusinessState::Streaming ),
      "processing" => Ok( BusinessState::Processing ),
      "completed" => Ok( BusinessState::Completed ),
      "failed" => Ok( BusinessState::Failed ),
      "cancelled" => Ok( BusinessState::Cancelled ),
      other => Err( RelayError::ConfigInvalid { detail : format!( "unknown request state {other:?}" ) } ),
    }
  }

  #[ derive( Debug, Serialize ) ]
  struct PagedRequestLogsBody
  {
    records : Vec< RequestRecord >,
    total : i64,
  }

  async fn list_requests( State( state ) : State< Arc< AppState > >, Query( query ) : Query< RequestQuery > ) -> Result< Json< PagedRequestLogsBody >, ApiError >
  {
    let filter = RequestLogFilter
    {
      start_time : query.start_time,
      end_time : query.end_time,
      state : query.state.as_deref().map( parse_business_state ).transpose()?,
      model : query.model,
      channel : query.channel.or( query.group ),
      endpoint_name : query.endpoint_name,
      limit : query.limit.unwrap_or( 50 ),
      offset : query.offset.unwrap_or( 0 ),
    };
    let page = state.request_log_store.list_filtered( &filter ).await?;
    Ok( Json( PagedRequestLogsBody { records : page.records, total : page.total } ) )
  }

  // ---------------------------------------------------------------------
  // usage aggregates
  // ---------------------------------------------------------------------

  /// Summed totals across a set of [`UsageSummary`] rows, alongside the
  /// rows themselves so callers can still break out by model/channel/endpoint.
  #[ derive( Debug, Serialize ) ]
  struct UsageAggregate
  {
    request_count : u64,
    success_count : u64,
    error_count : u64,
    tokens : TokenCounters,
    cost_usd : f64,
    rows : Vec< UsageSummary >,
  }

  fn aggregate_usage( rows : Vec< UsageSummary > ) -> UsageAggregate
  {
    let mut totals = UsageAggregate
    {
      request_count : 0,
      success_count : 0,
      error_count : 0,
      tokens : TokenCounters::default(),
      cost_usd : 0.0,
      rows : Vec::new(),
    };
    for row in rows
    {
      totals.request_count += row.request_count;
      totals.success_count += row.success_count;
      totals.error_count += row.error_count;
      totals.tokens.input += row.tokens.input;
      totals.tokens.output += row.tokens.output;
      totals.tokens.cache_creation_5m += row.tokens.cache_creation_5m;
      totals.tokens.cache_creation_1h += row.tokens.cache_creation_1h;
      totals.tokens.cache_read += row.tokens.cache_read;
      totals.cost_usd += row.cost_usd;
      totals.rows.push( row );
    }
    totals
  }

  async fn usage_today( State( state ) : State< Arc< AppState > > ) -> Result< Json< UsageAggregate >, ApiError >
  {
    let today = Utc::now().format( "%Y-%m-%d" ).to_string();
    let rows = state.usage_summary_store.list_for_date( &today ).await?;
    Ok( Json( aggregate_usage( rows ) ) )
  }

  async fn usage_all_time( State( state ) : State< Arc< AppState > > ) -> Result< Json< UsageAggregate >, ApiError >
  {
    let rows = state.usage_summary_store.list_all().await?;
    Ok( Json( aggregate_usage( rows ) ) )
  }

  #[ derive( Debug, Deserialize ) ]
  struct UsagePeriodQuery
  {
    start_date : String,
    end_date : String,
  }

  async fn usage_by_period( State( state ) : State< Arc< AppState > >, Query( query ) : Query< UsagePeriodQuery > ) -> Result< Json< UsageAggregate >, ApiError >
  {
    let rows = state.usage_summary_store.list_between( &query.start_date, &query.end_date ).await?;
    Ok( Json( aggregate_usage( rows ) ) )
  }

  // ---------------------------------------------------------------------
  // chart series
  // ---------------------------------------------------------------------

  /// One `(label, value)` point on any of the admin charts.
  #[ derive( Debug, Serialize ) ]
  struct ChartPoint
  {
    label : String,
    value : f64,
  }

  #[ derive( Debug, Deserialize ) ]
  struct DaysQuery
  {
    days : Option< u32 >,
  }

  fn recent_usage_rows( rows : Vec< UsageSummary > ) -> std::collections::BTreeMap< String, Vec< UsageSummary > >
  {
    let mut by_date : std::collections::BTreeMap< String, Vec< UsageSummary > > = std::collections::BTreeMap::new();
    for row in rows
    {
      by_date.entry( row.date.clone() ).or_default().push( row );
    }
    by_date
  }

  async fn chart_request_trend( State( state ) : State< Arc< AppState > >, Query( query ) : Query< DaysQuery > ) -> Result< Json< Vec< ChartPoint > >, ApiError >
  {
    let days = i64::from( query.days.unwrap_or( 7 ) ).max( 1 );
    let end = Utc::now();
    let start = end - chrono::Duration::days( days );
    let rows = state.usage_summary_store.list_between(
      &start.format( "%Y-%m-%d" ).to_string(),
      &end.format( "%Y-%m-%d" ).to_string(),
    ).await?;
    let points = recent_usage_rows( rows ).into_iter()
      .map( | ( date, rows ) | ChartPoint { label : date, value : rows.iter().map( | r | r.request_count ).sum::< u64 >() as f64 } )
      .collect();
    Ok( Json( points ) )
  }

  async fn chart_endpoint_cost_bar( State( state ) : State< Arc< AppState > > ) -> Result< Json< Vec< ChartPoint > >, ApiError >
  {
    let today = Utc::now().format( "%Y-%m-%d" ).to_string();
    let rows = state.usage_summary_store.list_for_date( &today ).await?;
    let mut by_endpoint : std::collections::BTreeMap< String, f64 > = std::collections::BTreeMap::new();
    for row in rows
    {
      *by_endpoint.entry( row.endpoint ).or_insert( 0.0 ) += row.cost_usd;
    }
    let points = by_endpoint.into_iter().map( | ( label, value ) | ChartPoint { label, value } ).collect();
    Ok( Json( points ) )
  }

  async fn chart_response_time( State( state ) : State< Arc< AppState > >, Query( query ) : Query< DaysQuery > ) -> Result< Json< Vec< ChartPoint > >, ApiError >
  {
    let days = i64::from( query.days.unwrap_or( 7 ) ).max( 1 );
    let end = Utc::now();
    let start = end - chrono::Duration::days( days );
    let filter = RequestLogFilter { start_time : Some( start ), end_time : Some( end ), limit : 5000, ..RequestLogFilter::default() };
    let page = state.request_log_store.list_filtered( &filter ).await?;

    let mut by_date : std::collections::BTreeMap< String, ( u64, u64 ) > = std::collections::BTreeMap::new();
    for record in page.records
    {
      let Some( duration_ms ) = record.duration_ms else { continue };
      let date = record.start_time.format( "%Y-%m-%d" ).to_string();
      let entry = by_date.entry( date ).or_insert( ( 0, 0 ) );
      entry.0 += duration_ms;
      entry.1 += 1;
    }
    let points = by_date.into_iter()
      .map( | ( label, ( total_ms, count ) ) | ChartPoint { label, value : total_ms as f64 / count.max( 1 ) as f64 } )
      .collect();
    Ok( Json( points ) )
  }

  async fn chart_connection_activity( State( state ) : State< Arc< AppState > > ) -> Result< Json< Vec< ChartPoint > >, ApiError >
  {
    let end = Utc::now();
    let start = end - chrono::Duration::hours( 24 );
    let filter = RequestLogFilter { start_time : Some( start ), end_time : Some( end ), limit : 5000, ..RequestLogFilter::default() };
    let page = state.request_log_store.list_filtered( &filter ).await?;

    let mut by_hour : std::collections::BTreeMap< String, u64 > = std::collections::BTreeMap::new();
    for record in page.records
    {
      let bucket = record.start_time.format( "%Y-%m-%d %H:00" ).to_string();
      *by_hour.entry( bucket ).or_insert( 0 ) += 1;
    }
    let points = by_hour.into_iter().map( | ( label, value ) | ChartPoint { label, value : value as f64 } ).collect();
    Ok( Json( points ) )
  }

  #[ derive( Debug, Serialize ) ]
  struct HealthPie
  {
    healthy : usize,
    unhealthy : usize,
    cooling : usize,
    never_checked : usize,
  }

  async fn chart_endpoint_health_pie( State( state ) : State< Arc< AppState > > ) -> Json< HealthPie >
  {
    let now = Utc::now();
    let health = state.health_registry();
    let cooldowns = state.cooldowns();
    let mut pie = HealthPie { healthy : 0, unhealthy : 0, cooling : 0, never_checked : 0 };

    for entry in &state.catalog.current().channels
    {
      for endpoint in &entry.endpoints
      {
        let status = health.status( endpoint.id, &cooldowns, now );
        if status.never_checked
        {
          pie.never_checked += 1;
        }
        else if status.cooldown_until.is_some_and( | until | now < until )
        {
          pie.cooling += 1;
        }
        else if status.healthy
        {
          pie.healthy += 1;
        }
        else
        {
          pie.unhealthy += 1;
        }
      }
    }
    Json( pie )
  }

  /// The full admin/UI router, mounted under `/api` by [`crate::lib`]'s
  /// top-level router alongside `/healthz`.
  #[ must_use ]
  pub fn router() -> Router< Arc< AppState > >
  {
    let api = Router::new()
      .route( "/status", get( get_status ) )
      .route( "/port", get( get_port ) )
      .route( "/settings", get( list_settings ) )
      .route( "/settings/batch", post( batch_set_settings ) )
      .route( "/settings/{category}", get( list_settings_by_category ) )
      .route( "/settings/{category}/reset", post( reset_settings_category ) )
      .route( "/settings/{category}/{key}", get( get_setting ).post( set_setting ) )
      .route( "/endpoints", get( list_endpoints ).post( create_endpoint ) )
      .route( "/endpoints/by-id/{id}", get( get_endpoint_by_id ).put( update_endpoint_by_id ).delete( delete_endpoint_by_id ) )
      .route( "/endpoints/by-id/{id}/enable", post( toggle_endpoint_enabled ) )
      .route( "/endpoints/by-id/{id}/failover", post( set_endpoint_failover ) )
      .route( "/endpoints/by-name/{channel}/{name}", get( get_endpoint_by_name ).put( update_endpoint_by_name ).delete( delete_endpoint_by_name ) )
      .route( "/channels", get( list_channels ).post( create_channel ) )
      .route( "/channels/{id}", put( update_channel ).delete( delete_channel ) )
      .route( "/channels/{channel}/endpoints", get( list_endpoints_by_channel ) )
      .route( "/channels/{name}/activate", post( activate_channel ) )
      .route( "/channels/{name}/pause", post( pause_channel ) )
      .route( "/channels/{name}/resume", post( resume_channel ) )
      .route( "/requests", get( list_requests ) )
      .route( "/usage/today", get( usage_today ) )
      .route( "/usage/all-time", get( usage_all_time ) )
      .route( "/usage/by-period", get( usage_by_period ) )
      .route( "/charts/request-trend", get( chart_request_trend ) )
      .route( "/charts/response-time", get( chart_response_time ) )
      .route( "/charts/connection-activity", get( chart_connection_activity ) )
      .route( "/charts/endpoint-health-pie", get( chart_endpoint_health_pie ) )
      .route( "/charts/endpoint-cost-bar", get( chart_endpoint_cost_bar ) );

    Router::new()
      .route( "/healthz", get( healthz ) )
      .nest( "/api", api )
  }
}

crate::mod_interface!
{
  exposed use router;
}
