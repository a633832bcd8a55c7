//! Parsing and formatting for `Duration`-typed settings
//!
//! `Setting::value` stores durations as a humantime-style string — a bare
//! integer (seconds) or an integer with a single-letter unit suffix
//! (`s`, `m`, `h`, `d`). This is deliberately narrower than the general
//! humantime grammar (no compound strings like `"1h30m"`): every duration
//! this fabric has is a single bound, not a composite one.

mod private
{
  use relay_types::{ RelayError, RelayResult };
  use std::time::Duration;

  /// Parse a stored duration value.
  ///
  /// # Errors
  ///
  /// Returns [`RelayError::ConfigInvalid`] if `raw` isn't a bare integer or
  /// an integer followed by one of `s`/`m`/`h`/`d`.
  pub fn parse_duration_setting( raw : &str ) -> RelayResult< Duration >
  {
    let raw = raw.trim();
    let ( digits, unit_seconds ) = match raw.chars().last()
    {
      Some( 's' ) => ( &raw[ .. raw.len() - 1 ], 1 ),
      Some( 'm' ) => ( &raw[ .. raw.len() - 1 ], 60 ),
      Some( 'h' ) => ( &raw[ .. raw.len() - 1 ], 3_600 ),
      Some( 'd' ) => ( &raw[ .. raw.len() - 1 ], 86_400 ),
      _ => ( raw, 1 ),
    };
    let amount : u64 = digits.trim().parse()
      .map_err( | _ | RelayError::ConfigInvalid { detail : format!( "'{raw}' is not a valid duration setting" ) } )?;
    Ok( Duration::from_secs( amount * unit_seconds ) )
  }

  /// Render a duration back to the humantime-style form this module
  /// parses, always in whole seconds.
  #[ must_use ]
  pub fn format_duration_setting( value : Duration ) -> String
  {
    format!( "{}s", value.as_secs() )
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn parses_bare_integer_as_seconds()
    {
      assert_eq!( parse_duration_setting( "45" ).unwrap(), Duration::from_secs( 45 ) );
    }

    #[ test ]
    fn parses_each_unit_suffix()
    {
      assert_eq!( parse_duration_setting( "30s" ).unwrap(), Duration::from_secs( 30 ) );
      assert_eq!( parse_duration_setting( "5m" ).unwrap(), Duration::from_secs( 300 ) );
      assert_eq!( parse_duration_setting( "2h" ).unwrap(), Duration::from_secs( 7_200 ) );
      assert_eq!( parse_duration_setting( "1d" ).unwrap(), Duration::from_secs( 86_400 ) );
    }

    #[ test ]
    fn rejects_garbage()
    {
      assert!( parse_duration_setting( "soon" ).is_err() );
    }

    #[ test ]
    fn format_then_parse_round_trips()
    {
      let original = Duration::from_secs( 600 );
      assert_eq!( parse_duration_setting( &format_duration_setting( original ) ).unwrap(), original );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    parse_duration_setting,
    format_duration_setting,
  };
}
