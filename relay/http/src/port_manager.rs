//! Listener port resolution
//!
//! Binds `host:preferred_port`, falling forward to the next port when the
//! preferred one is already occupied, and reports what actually happened
//! rather than silently rebinding somewhere the operator didn't ask for.

mod private
{
  use std::net::SocketAddr;
  use tokio::net::TcpListener;

  /// Outcome of resolving the actual listening port, returned to the admin
  /// surface's `/api/port` operation.
  #[ derive( Debug, Clone, Copy, serde::Serialize ) ]
  pub struct PortInfo
  {
    /// Port requested by configuration.
    pub preferred_port : u16,
    /// Port actually bound.
    pub actual_port : u16,
    /// Whether `actual_port == preferred_port`.
    pub is_default : bool,
    /// Whether the preferred port had to be skipped because it was occupied.
    pub was_occupied : bool,
  }

  /// Bind `host:preferred_port`, incrementing the port up to `max_attempts`
  /// times (inclusive of the first try) if it is already occupied.
  ///
  /// # Errors
  ///
  /// Returns the last bind error if every attempt in range fails, or an
  /// [`std::io::Error`] if `host:port` does not parse as a socket address.
  pub async fn bind_with_fallback( host : &str, preferred_port : u16, max_attempts : u16 ) -> std::io::Result< ( TcpListener, PortInfo ) >
  {
    let mut was_occupied = false;
    let mut last_error = None;

    for offset in 0..max_attempts
    {
      let port = preferred_port.saturating_add( offset );
      let addr : SocketAddr = format!( "{host}:{port}" ).parse()
        .map_err( | error : std::net::AddrParseError | std::io::Error::new( std::io::ErrorKind::InvalidInput, error.to_string() ) )?;
      match TcpListener::bind( addr ).await
      {
        Ok( listener ) =>
        {
          let info = PortInfo
          {
            preferred_port,
            actual_port : port,
            is_default : port == preferred_port,
            was_occupied,
          };
          return Ok( ( listener, info ) );
        }
        Err( error ) =>
        {
          was_occupied = true;
          last_error = Some( error );
        }
      }
    }
    Err( last_error.unwrap_or_else( || std::io::Error::new( std::io::ErrorKind::AddrNotAvailable, "no ports available in range" ) ) )
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ tokio::test ]
    async fn binds_preferred_port_when_free()
    {
      let probe = TcpListener::bind( "127.0.0.1:0" ).await.unwrap();
      let port = probe.local_addr().unwrap().port();
      drop( probe );

      let ( _listener, info ) = bind_with_fallback( "127.0.0.1", port, 1 ).await.unwrap();
      assert!( info.is_default );
      assert!( !info.was_occupied );
      assert_eq!( info.actual_port, port );
    }

    #[ tokio::test ]
    async fn falls_back_when_preferred_port_is_taken()
    {
      let blocker = TcpListener::bind( "127.0.0.1:0" ).await.unwrap();
      let taken_port = blocker.local_addr().unwrap().port();

      let ( _listener, info ) = bind_with_fallback( "127.0.0.1", taken_port, 3 ).await.unwrap();
      assert!( info.was_occupied );
      assert!( !info.is_default );
      assert_ne!( info.actual_port, taken_port );
      drop( blocker );
    }

    #[ tokio::test ]
    async fn exhausting_every_attempt_returns_the_bind_error()
    {
      let first = TcpListener::bind( "127.0.0.1:0" ).await.unwrap();
      let port = first.local_addr().unwrap().port();
      let second = TcpListener::bind( ( "127.0.0.1", port + 1 ) ).await.unwrap();

      assert!( bind_with_fallback( "127.0.0.1", port, 2 ).await.is_err() );
      drop( first );
      drop( second );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    PortInfo,
    bind_with_fallback,
  };
}
