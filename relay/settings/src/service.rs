//! Typed read accessors, writes, and the hot-reload bus

mod private
{
  use crate::defaults::DEFAULTS;
  use crate::duration::parse_duration_setting;
  use crate::event::SettingsEvent;
  use chrono::Utc;
  use relay_persistence::SettingStore;
  use relay_types::{ RelayError, RelayResult, Setting };
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::sync::broadcast;

  const EVENT_CHANNEL_CAPACITY : usize = 256;

  fn config_error( category : &str, key : &str, reason : &str ) -> RelayError
  {
    RelayError::ConfigInvalid { detail : format!( "setting '{category}/{key}': {reason}" ) }
  }

  /// Typed read/write access to the `settings` table, with a hot-reload
  /// broadcast bus. Holds no cache of its own — every read goes to the
  /// store; callers that need a cached policy value (`relay_routing`,
  /// `relay_health`, `relay_pool`, the HTTP layer) subscribe and rebuild
  /// their own config struct from a fresh read whenever a non-restart
  /// event arrives.
  #[ derive( Debug ) ]
  pub struct SettingsService
  {
    store : Arc< SettingStore >,
    events : broadcast::Sender< SettingsEvent >,
  }

  impl SettingsService
  {
    /// A service over `store` with a fresh event bus.
    #[ must_use ]
    pub fn new( store : Arc< SettingStore > ) -> Self
    {
      let ( events, _receiver ) = broadcast::channel( EVENT_CHANNEL_CAPACITY );
      Self { store, events }
    }

    /// Subscribe to every write from this point on.
    pub fn subscribe( &self ) -> broadcast::Receiver< SettingsEvent >
    {
      self.events.subscribe()
    }

    /// Insert whichever [`DEFAULTS`] rows are not already present. Meant
    /// for startup, before any caller reads through this service; does not
    /// broadcast, since there is nothing yet to hot-reload.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying store surfaces on database failure.
    pub async fn ensure_defaults_seeded( &self ) -> RelayResult< usize >
    {
      let mut seeded = 0;
      for default in DEFAULTS
      {
        if self.store.get( default.category, default.key ).await?.is_some()
        {
          continue;
        }
        let now = Utc::now();
        self.store.upsert( Setting
        {
          category : default.category.to_string(),
          key : default.key.to_string(),
          value : default.value.to_string(),
          value_type : default.value_type,
          label : default.label.to_string(),
          description : default.description.to_string(),
          display_order : default.display_order,
          requires_restart : default.requires_restart,
          created_at : now,
          updated_at : now,
        } ).await?;
        seeded += 1;
      }
      Ok( seeded )
    }

    /// Raw string value, or `None` if the row doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying store surfaces on database failure.
    pub async fn get_value( &self, category : &str, key : &str ) -> RelayResult< Option< String > >
    {
      Ok( self.store.get( category, key ).await?.map( | setting | setting.value ) )
    }

    /// Typed integer read with a caller-supplied default for a missing row.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if the row exists but doesn't
    /// parse as an integer, or whatever the store surfaces on database
    /// failure.
    pub async fn get_int( &self, category : &str, key : &str, default : i64 ) -> RelayResult< i64 >
    {
      match self.store.get( category, key ).await?
      {
        Some( setting ) => setting.value.trim().parse()
          .map_err( | _ | config_error( category, key, "not a valid integer" ) ),
        None => Ok( default ),
      }
    }

    /// Typed float read with a caller-supplied default for a missing row.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if the row exists but doesn't
    /// parse as a float, or whatever the store surfaces on database
    /// failure.
    pub async fn get_float( &self, category : &str, key : &str, default : f64 ) -> RelayResult< f64 >
    {
      match self.store.get( category, key ).await?
      {
        Some( setting ) => setting.value.trim().parse()
          .map_err( | _ | config_error( category, key, "not a valid float" ) ),
        None => Ok( default ),
      }
    }

    /// Typed boolean read with a caller-supplied default for a missing row.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if the row exists but doesn't
    /// parse as `true`/`false`, or whatever the store surfaces on database
    /// failure.
    pub async fn get_bool( &self, category : &str, key : &str, default : bool ) -> RelayResult< bool >
    {
      match self.store.get( category, key ).await?
      {
        Some( setting ) => setting.value.trim().parse()
          .map_err( | _ | config_error( category, key, "not a valid bool" ) ),
        None => Ok( default ),
      }
    }

    /// Typed duration read with a caller-supplied default for a missing
    /// row.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if the row exists but doesn't
    /// parse as a duration, or whatever the store surfaces on database
    /// failure.
    pub async fn get_duration( &self, category : &str, key : &str, default : Duration ) -> RelayResult< Duration >
    {
      match self.store.get( category, key ).await?
      {
        Some( setting ) => parse_duration_setting( &setting.value ),
        None => Ok( default ),
      }
    }

    /// Update one row's value, then broadcast: an informational
    /// [`SettingsEvent::Changed`] if the row requires a restart to take
    /// effect, otherwise the same event for subscribers to act on — the
    /// flag tells them which.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if `category`/`key` names no
    /// existing row — rows are seeded from [`DEFAULTS`], never created ad
    /// hoc by a write.
    pub async fn set( &self, category : &str, key : &str, value : String ) -> RelayResult< Setting >
    {
      let mut existing = self.store.get( category, key ).await?
        .ok_or_else( || config_error( category, key, "no such setting; it must be seeded first" ) )?;
      existing.value = value;
      let saved = self.store.upsert( existing ).await?;
      let _ = self.events.send( SettingsEvent::Changed
      {
        category : saved.category.clone(),
        key : saved.key.clone(),
        requires_restart : saved.requires_restart,
      } );
      Ok( saved )
    }

    /// Update several rows in one transaction, committing once and
    /// broadcasting a single [`SettingsEvent::BatchApplied`] afterward.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if any `(category, key)` pair
    /// names no existing row — no partial writes land in that case.
    pub async fn update_and_apply( &self, updates : Vec< ( String, String, String ) > ) -> RelayResult< Vec< Setting > >
    {
      let mut resolved = Vec::with_capacity( updates.len() );
      for ( category, key, value ) in &updates
      {
        let mut existing = self.store.get( category, key ).await?
          .ok_or_else( || config_error( category, key, "no such setting; it must be seeded first" ) )?;
        existing.value = value.clone();
        resolved.push( existing );
      }

      let mut txn = self.store.with_transaction().await?;
      let mut saved = Vec::with_capacity( resolved.len() );
      for setting in resolved
      {
        saved.push( self.store.upsert_in_txn( &mut txn, setting ).await? );
      }
      txn.commit().await?;

      let mut categories : Vec< String > = saved.iter().map( | setting | setting.category.clone() ).collect();
      categories.sort_unstable();
      categories.dedup();
      let _ = self.events.send( SettingsEvent::BatchApplied { categories } );

      Ok( saved )
    }

    /// Delete every row in `category` and re-seed it from [`DEFAULTS`], in
    /// one transaction, broadcasting a single `BatchApplied` afterward.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying store surfaces on database failure.
    pub async fn reset_category( &self, category : &str ) -> RelayResult< Vec< Setting > >
    {
      let mut txn = self.store.with_transaction().await?;
      self.store.delete_category_in_txn( &mut txn, category ).await?;

      let mut seeded = Vec::new();
      let now = Utc::now();
      for default in DEFAULTS.iter().filter( | default | default.category == category )
      {
        let setting = Setting
        {
          category : default.category.to_string(),
          key : default.key.to_string(),
          value : default.value.to_string(),
          value_type : default.value_type,
          label : default.label.to_string(),
          description : default.description.to_string(),
          display_order : default.display_order,
          requires_restart : default.requires_restart,
          created_at : now,
          updated_at : now,
        };
        seeded.push( self.store.upsert_in_txn( &mut txn, setting ).await? );
      }
      txn.commit().await?;

      let _ = self.events.send( SettingsEvent::BatchApplied { categories : vec![ category.to_string() ] } );
      Ok( seeded )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    async fn service() -> SettingsService
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      relay_persistence::migrate( &pool ).await.unwrap();
      let service = SettingsService::new( Arc::new( SettingStore::new( pool ) ) );
      service.ensure_defaults_seeded().await.unwrap();
      service
    }

    #[ tokio::test ]
    async fn seeding_is_idempotent()
    {
      let service = service().await;
      let seeded_again = service.ensure_defaults_seeded().await.unwrap();
      assert_eq!( seeded_again, 0 );
    }

    #[ tokio::test ]
    async fn typed_reads_parse_seeded_defaults()
    {
      let service = service().await;
      assert_eq!( service.get_int( "retry", "max_attempts", -1 ).await.unwrap(), 3 );
      assert!( ( service.get_float( "retry", "backoff_jitter_fraction", -1.0 ).await.unwrap() - 0.15 ).abs() < f64::EPSILON );
      assert!( service.get_bool( "failover", "enabled", false ).await.unwrap() );
      assert_eq!( service.get_duration( "failover", "default_cooldown", Duration::from_secs( 0 ) ).await.unwrap(), Duration::from_secs( 600 ) );
    }

    #[ tokio::test ]
    async fn missing_row_falls_back_to_caller_default()
    {
      let service = service().await;
      assert_eq!( service.get_int( "nope", "nope", 42 ).await.unwrap(), 42 );
    }

    #[ tokio::test ]
    async fn set_updates_value_and_broadcasts()
    {
      let service = service().await;
      let mut receiver = service.subscribe();
      service.set( "retry", "max_attempts", "5".to_string() ).await.unwrap();

      assert_eq!( service.get_int( "retry", "max_attempts", -1 ).await.unwrap(), 5 );
      let event = receiver.recv().await.unwrap();
      assert_eq!( event, SettingsEvent::Changed { category : "retry".to_string(), key : "max_attempts".to_string(), requires_restart : false } );
    }

    #[ tokio::test ]
    async fn set_on_unseeded_key_is_rejected()
    {
      let service = service().await;
      assert!( service.set( "retry", "no_such_key", "1".to_string() ).await.is_err() );
    }

    #[ tokio::test ]
    async fn update_and_apply_commits_all_or_nothing()
    {
      let service = service().await;
      let result = service.update_and_apply( vec!
      [
        ( "retry".to_string(), "max_attempts".to_string(), "7".to_string() ),
        ( "retry".to_string(), "no_such_key".to_string(), "1".to_string() ),
      ] ).await;

      assert!( result.is_err() );
      assert_eq!( service.get_int( "retry", "max_attempts", -1 ).await.unwrap(), 3 );
    }

    #[ tokio::test ]
    async fn reset_category_restores_defaults_after_a_change()
    {
      let service = service().await;
      service.set( "retry", "max_attempts", "99".to_string() ).await.unwrap();
      service.reset_category( "retry" ).await.unwrap();

      assert_eq!( service.get_int( "retry", "max_attempts", -1 ).await.unwrap(), 3 );
    }
  }
}

crate::mod_interface!
{
  exposed use SettingsService;
}
