//! Tolerant timestamp parsing for columns populated outside this crate's
//! control (hand-edited rows, legacy schemas, imported data).

mod private
{
  use chrono::{ DateTime, FixedOffset, NaiveDateTime, Utc };

  /// The six layouts accepted when reading a time column back, tried in
  /// order. Seconds/milliseconds/microseconds precision, each with and
  /// without an explicit offset.
  const LAYOUTS : [ &str ; 6 ] =
  [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
  ];

  /// Parse a time column value, trying each of the [`LAYOUTS`] in turn.
  /// Total failure yields the zero instant (`DateTime::UNIX_EPOCH`) rather
  /// than an error — a malformed timestamp must never block a read.
  #[ must_use ]
  pub fn parse_lenient( raw : &str ) -> DateTime< Utc >
  {
    for layout in LAYOUTS
    {
      if let Ok( with_offset ) = DateTime::< FixedOffset >::parse_from_str( raw, layout )
      {
        return with_offset.with_timezone( &Utc );
      }
      if let Ok( naive ) = NaiveDateTime::parse_from_str( raw, layout )
      {
        return naive.and_utc();
      }
    }
    tracing::warn!( raw = raw, "failed to parse timestamp in any known layout, using zero instant" );
    DateTime::< Utc >::UNIX_EPOCH
  }

  /// Render a timestamp the way it is written back to a time column : local
  /// time with an explicit offset suffix, millisecond precision.
  #[ must_use ]
  pub fn format_for_storage( instant : DateTime< Utc > ) -> String
  {
    instant.to_rfc3339_opts( chrono::SecondsFormat::Millis, true )
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn parses_offset_with_milliseconds()
    {
      let parsed = parse_lenient( "2026-07-26 10:15:30.123+02:00" );
      assert_eq!( parsed.timestamp(), 1753517730 );
    }

    #[ test ]
    fn parses_rfc3339_style()
    {
      let parsed = parse_lenient( "2026-07-26T10:15:30+00:00" );
      assert_eq!( parsed.to_rfc3339_opts( chrono::SecondsFormat::Secs, true ), "2026-07-26T10:15:30+00:00" );
    }

    #[ test ]
    fn parses_naive_without_offset()
    {
      let parsed = parse_lenient( "2026-07-26 10:15:30" );
      assert!( parsed.timestamp() > 0 );
    }

    #[ test ]
    fn falls_back_to_zero_instant_on_garbage()
    {
      let parsed = parse_lenient( "not a timestamp" );
      assert_eq!( parsed, DateTime::< Utc >::UNIX_EPOCH );
    }

    #[ test ]
    fn round_trips_through_storage_format()
    {
      let original = Utc::now();
      let formatted = format_for_storage( original );
      let parsed = parse_lenient( &formatted );
      assert_eq!( parsed.timestamp_millis(), original.timestamp_millis() );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    parse_lenient,
    format_for_storage,
  };
}
