//! HAL client on the D-Bus system bus.
//!
//! The form factor lives in the `system.formfactor` property of HAL's
//! computer device object. Sending the request and waiting for its reply
//! are separate steps so that probing never blocks on HAL.

use std::{future::Future, io, num::NonZeroU32, pin::pin};

use futures::{TryStreamExt, future::BoxFuture};
use log::debug;
use zbus::{Connection, Message, MessageStream, message, zvariant::Signature};

use crate::error::{FormFactorError, Result};

pub const HAL_SERVICE: &str = "org.freedesktop.Hal";
pub const HAL_COMPUTER_PATH: &str = "/org/freedesktop/Hal/devices/computer";
pub const HAL_DEVICE_INTERFACE: &str = "org.freedesktop.Hal.Device";
pub const HAL_GET_PROPERTY_STRING: &str = "GetPropertyString";

/// HAL property holding the machine form factor
pub const FORMFACTOR_PROPERTY: &str = "system.formfactor";

/// Reply to an in-flight `GetPropertyString` call.
pub type PendingReply = BoxFuture<'static, Result<String>>;

/// Opens bus connections.
pub trait BusConnector: Send + Sync + 'static {
   type Bus: HalBus;

   fn connect(&self) -> impl Future<Output = Result<Self::Bus>> + Send;
}

/// A bus connection able to issue HAL property lookups.
pub trait HalBus: Send + Sync + 'static {
   /// Queues a `GetPropertyString` call and returns without waiting for
   /// the reply. The returned future resolves once HAL answers.
   fn get_property_string(
      &self,
      property: &'static str,
   ) -> impl Future<Output = Result<PendingReply>> + Send;
}

/// Connects to the D-Bus system bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBus;

impl BusConnector for SystemBus {
   type Bus = Connection;

   async fn connect(&self) -> Result<Connection> {
      Connection::system()
         .await
         .map_err(|e| FormFactorError::Resource(format!("System bus unavailable: {e}")))
   }
}

impl HalBus for Connection {
   async fn get_property_string(&self, property: &'static str) -> Result<PendingReply> {
      let request = property_request(property).map_err(|e| {
         FormFactorError::Resource(format!("Failed to create {property} request: {e}"))
      })?;
      let serial = request.primary_header().serial_num();

      // Subscribe before sending so the reply cannot slip past us.
      let replies = MessageStream::from(self);
      self.send(&request).await.map_err(|e| {
         FormFactorError::Io(io::Error::other(format!(
            "Failed to send {property} request: {e}"
         )))
      })?;
      debug!("Sent {HAL_GET_PROPERTY_STRING}({property}) with serial {serial}");

      Ok(Box::pin(wait_for_reply(replies, serial)))
   }
}

/// Builds the `GetPropertyString` method call for `property`.
pub fn property_request(property: &str) -> zbus::Result<Message> {
   Message::method_call(HAL_COMPUTER_PATH, HAL_GET_PROPERTY_STRING)?
      .destination(HAL_SERVICE)?
      .interface(HAL_DEVICE_INTERFACE)?
      .build(&(property,))
}

async fn wait_for_reply(replies: MessageStream, serial: NonZeroU32) -> Result<String> {
   let mut replies = pin!(replies);
   while let Some(msg) = replies.try_next().await? {
      if msg.header().reply_serial() == Some(serial) {
         return decode_string_reply(&msg);
      }
   }
   Err(FormFactorError::Protocol(
      "Bus closed before the reply arrived".into(),
   ))
}

/// Extracts the leading string argument of a reply.
///
/// Error replies carry their message text as a leading string and are read
/// the same way, so a missing HAL still yields a (meaningless) form factor.
/// Arguments after the first are ignored.
pub fn decode_string_reply(msg: &Message) -> Result<String> {
   match msg.message_type() {
      message::Type::MethodReturn => {},
      message::Type::Error => {
         let header = msg.header();
         let name = header
            .error_name()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);
         debug!("{HAL_GET_PROPERTY_STRING} answered with error {name}");
      },
      other => {
         return Err(FormFactorError::Protocol(format!(
            "Unexpected message type: {other:?}"
         )));
      },
   }

   let body = msg.body();
   let leading_string = match body.signature() {
      Signature::Str => true,
      Signature::Structure(fields) => matches!(fields.iter().next(), Some(Signature::Str)),
      _ => false,
   };
   if !leading_string {
      return Err(FormFactorError::Protocol(format!(
         "Unexpected reply signature `{}`",
         body.signature()
      )));
   }

   body
      .deserialize_unchecked::<String>()
      .map_err(|e| FormFactorError::Protocol(format!("Unexpected reply body: {e}")))
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::formfactor::class::minor_class_for;

   #[test]
   fn test_property_request_targets_hal_computer() -> Result<()> {
      let msg = property_request(FORMFACTOR_PROPERTY)?;
      let header = msg.header();

      assert_eq!(msg.message_type(), message::Type::MethodCall);
      assert_eq!(header.destination().unwrap().as_str(), HAL_SERVICE);
      assert_eq!(header.path().unwrap().as_str(), HAL_COMPUTER_PATH);
      assert_eq!(header.interface().unwrap().as_str(), HAL_DEVICE_INTERFACE);
      assert_eq!(header.member().unwrap().as_str(), HAL_GET_PROPERTY_STRING);

      let arg: String = msg.body().deserialize()?;
      assert_eq!(arg, "system.formfactor");
      Ok(())
   }

   #[test]
   fn test_non_reply_message_is_protocol_error() -> Result<()> {
      let msg = property_request(FORMFACTOR_PROPERTY)?;
      assert!(matches!(
         decode_string_reply(&msg),
         Err(FormFactorError::Protocol(_))
      ));
      Ok(())
   }

   #[test]
   fn test_string_reply_is_decoded() -> Result<()> {
      let call = property_request(FORMFACTOR_PROPERTY)?;
      let reply = Message::method_return(&call.header())?.build(&("laptop",))?;
      assert_eq!(decode_string_reply(&reply)?, "laptop");
      Ok(())
   }

   #[test]
   fn test_trailing_arguments_are_ignored() -> Result<()> {
      let call = property_request(FORMFACTOR_PROPERTY)?;
      let reply = Message::method_return(&call.header())?.build(&("laptop", "x"))?;
      assert_eq!(decode_string_reply(&reply)?, "laptop");
      Ok(())
   }

   #[test]
   fn test_non_string_reply_is_protocol_error() -> Result<()> {
      let call = property_request(FORMFACTOR_PROPERTY)?;

      let reply = Message::method_return(&call.header())?.build(&(42u32,))?;
      assert!(matches!(
         decode_string_reply(&reply),
         Err(FormFactorError::Protocol(_))
      ));

      let reply = Message::method_return(&call.header())?.build(&(42u32, "laptop"))?;
      assert!(matches!(
         decode_string_reply(&reply),
         Err(FormFactorError::Protocol(_))
      ));
      Ok(())
   }

   #[test]
   fn test_empty_reply_is_protocol_error() -> Result<()> {
      let call = property_request(FORMFACTOR_PROPERTY)?;
      let reply = Message::method_return(&call.header())?.build(&())?;
      assert!(matches!(
         decode_string_reply(&reply),
         Err(FormFactorError::Protocol(_))
      ));
      Ok(())
   }

   #[test]
   fn test_error_reply_yields_its_message() -> Result<()> {
      let call = property_request(FORMFACTOR_PROPERTY)?;
      let reply = Message::error(&call.header(), "org.freedesktop.DBus.Error.ServiceUnknown")?
         .build(&("The name org.freedesktop.Hal was not provided",))?;

      let text = decode_string_reply(&reply)?;
      assert_eq!(text, "The name org.freedesktop.Hal was not provided");
      assert_eq!(minor_class_for(Some(text.as_str())), 0);
      Ok(())
   }
}
