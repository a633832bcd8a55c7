//! Ordered point-in-time view of channels and endpoints
//!
//! Channels are sorted `(priority asc, created_at desc, name asc)`; within
//! each channel, endpoints carry the same ordering. This is the order the
//! routing engine walks when building a candidate list.

mod private
{
  use relay_types::{ Channel, Endpoint };
  use std::cmp::Ordering;

  /// One channel paired with its endpoints, both already in selection order.
  #[ derive( Debug, Clone ) ]
  pub struct ChannelEntry
  {
    /// The channel record.
    pub channel : Channel,
    /// Endpoints owned by this channel, in selection order.
    pub endpoints : Vec< Endpoint >,
  }

  /// An immutable, ordered snapshot of the whole catalog.
  #[ derive( Debug, Clone, Default ) ]
  pub struct CatalogSnapshot
  {
    /// Channels in failover order.
    pub channels : Vec< ChannelEntry >,
  }

  fn channel_order( a : &Channel, b : &Channel ) -> Ordering
  {
    a.priority.cmp( &b.priority )
      .then_with( || b.created_at.cmp( &a.created_at ) )
      .then_with( || a.name.cmp( &b.name ) )
  }

  fn endpoint_order( a : &Endpoint, b : &Endpoint ) -> Ordering
  {
    a.priority.cmp( &b.priority )
      .then_with( || b.created_at.cmp( &a.created_at ) )
      .then_with( || a.name.cmp( &b.name ) )
  }

  impl CatalogSnapshot
  {
    /// Build a snapshot from unordered rows, sorting channels and, within
    /// each, the endpoints that belong to it.
    #[ must_use ]
    pub fn build( mut channels : Vec< Channel >, mut endpoints : Vec< Endpoint > ) -> Self
    {
      channels.sort_by( channel_order );
      endpoints.sort_by( endpoint_order );

      let entries = channels
      .into_iter()
      .map( | channel |
      {
        let owned : Vec< Endpoint > = endpoints.iter().filter( | e | e.channel == channel.name ).cloned().collect();
        ChannelEntry { channel, endpoints : owned }
      } )
      .collect();

      Self { channels : entries }
    }

    /// Endpoints belonging to `channel`, in selection order, already
    /// filtered to nothing (callers filter further by health/cooldown).
    #[ must_use ]
    pub fn candidates_for_channel( &self, channel : &str ) -> Vec< Endpoint >
    {
      self.channels.iter()
      .find( | entry | entry.channel.name == channel )
      .map( | entry | entry.endpoints.clone() )
      .unwrap_or_default()
    }

    /// All channels, in failover order.
    #[ must_use ]
    pub fn channels_in_failover_order( &self ) -> Vec< Channel >
    {
      self.channels.iter().map( | entry | entry.channel.clone() ).collect()
    }

    /// Whether `channel` exists and participates in inter-channel failover.
    #[ must_use ]
    pub fn is_channel_failover_enabled( &self, channel : &str ) -> bool
    {
      self.channels.iter()
      .find( | entry | entry.channel.name == channel )
      .is_some_and( | entry | entry.channel.participates_in_channel_failover )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use chrono::{ TimeZone, Utc };

    fn channel( name : &str, priority : i32, created_secs : i64 ) -> Channel
    {
      Channel
      {
        id : 0,
        name : name.to_string(),
        website : None,
        priority,
        participates_in_channel_failover : true,
        created_at : Utc.timestamp_opt( created_secs, 0 ).unwrap(),
        updated_at : Utc.timestamp_opt( created_secs, 0 ).unwrap(),
      }
    }

    fn endpoint( channel : &str, name : &str, priority : i32, created_secs : i64 ) -> Endpoint
    {
      Endpoint
      {
        id : 0,
        channel : channel.to_string(),
        name : name.to_string(),
        url : "http://example.invalid".to_string(),
        bearer_token : None,
        api_key : None,
        custom_headers : std::collections::BTreeMap::new(),
        priority,
        participates_in_failover : true,
        cooldown_seconds : None,
        timeout_seconds : 30,
        supports_token_counting : true,
        cost_multiplier_overall : 1.0,
        cost_multiplier_input : 1.0,
        cost_multiplier_output : 1.0,
        cost_multiplier_cache_creation_5m : 1.0,
        cost_multiplier_cache_creation_1h : 1.0,
        cost_multiplier_cache_read : 1.0,
        enabled : true,
        created_at : Utc.timestamp_opt( created_secs, 0 ).unwrap(),
        updated_at : Utc.timestamp_opt( created_secs, 0 ).unwrap(),
      }
    }

    #[ test ]
    fn channels_sort_by_priority_then_newest_first_then_name()
    {
      let snapshot = CatalogSnapshot::build(
        vec!
        [
          channel( "b", 1, 100 ),
          channel( "a", 1, 200 ),
          channel( "fast", 0, 50 ),
        ],
        Vec::new(),
      );
      let names : Vec< _ > = snapshot.channels_in_failover_order().into_iter().map( | c | c.name ).collect();
      assert_eq!( names, vec![ "fast".to_string(), "a".to_string(), "b".to_string() ] );
    }

    #[ test ]
    fn endpoints_are_scoped_to_their_own_channel()
    {
      let snapshot = CatalogSnapshot::build(
        vec![ channel( "primary", 0, 1 ), channel( "backup", 1, 1 ) ],
        vec![ endpoint( "primary", "p1", 0, 1 ), endpoint( "backup", "b1", 0, 1 ) ],
      );
      let candidates = snapshot.candidates_for_channel( "primary" );
      assert_eq!( candidates.len(), 1 );
      assert_eq!( candidates[ 0 ].name, "p1" );
    }

    #[ test ]
    fn unknown_channel_yields_no_candidates()
    {
      let snapshot = CatalogSnapshot::build( vec![ channel( "primary", 0, 1 ) ], Vec::new() );
      assert!( snapshot.candidates_for_channel( "nonexistent" ).is_empty() );
    }

    #[ test ]
    fn failover_flag_reads_from_the_channel_record()
    {
      let mut disabled = channel( "solo", 0, 1 );
      disabled.participates_in_channel_failover = false;
      let snapshot = CatalogSnapshot::build( vec![ disabled ], Vec::new() );
      assert!( !snapshot.is_channel_failover_enabled( "solo" ) );
      assert!( !snapshot.is_channel_failover_enabled( "nonexistent" ) );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    ChannelEntry,
    CatalogSnapshot,
  };
}
