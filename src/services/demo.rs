//! A small in-process service used by the binary and the integration tests.
//!
//! - `Echo` answers with a single record.
//! - `ListItems` streams pages with a scalar total and two sequence fields,
//!   optionally failing part way through.
//! - `Whoami` reports the credential the call carried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rpc::credentials::AUTHORIZATION;
use crate::rpc::{
    CallContext, CallOptions, CallResult, ChannelReceiver, FieldDescriptor, FieldType, MethodTable,
    Record, RecordDescriptor, Schema, Status, VecReceiver,
};

/// Largest reply `Echo` will build.
const MAX_ECHO_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoRequest {
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Repeat")]
    pub repeat: u32,
    #[serde(rename = "Verbose")]
    pub verbose: bool,
    #[serde(rename = "SentAt")]
    pub sent_at: Option<DateTime<Utc>>,
}

static ECHO_REQUEST_FIELDS: [FieldDescriptor; 4] = [
    FieldDescriptor::scalar("message", FieldType::String).wire("Message"),
    FieldDescriptor::scalar("repeat", FieldType::UInt).wire("Repeat"),
    FieldDescriptor::scalar("verbose", FieldType::Bool).wire("Verbose"),
    FieldDescriptor::scalar("sent_at", FieldType::Timestamp).wire("SentAt"),
];
static ECHO_REQUEST: RecordDescriptor = RecordDescriptor {
    name: "EchoRequest",
    fields: &ECHO_REQUEST_FIELDS,
};

impl Schema for EchoRequest {
    fn descriptor() -> &'static RecordDescriptor {
        &ECHO_REQUEST
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoReply {
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Verbose")]
    pub verbose: bool,
    #[serde(rename = "SentAt")]
    pub sent_at: Option<DateTime<Utc>>,
}

static ECHO_REPLY_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor::scalar("message", FieldType::String).wire("Message"),
    FieldDescriptor::scalar("verbose", FieldType::Bool).wire("Verbose"),
    FieldDescriptor::scalar("sent_at", FieldType::Timestamp).wire("SentAt"),
];
static ECHO_REPLY: RecordDescriptor = RecordDescriptor {
    name: "EchoReply",
    fields: &ECHO_REPLY_FIELDS,
};

impl Schema for EchoReply {
    fn descriptor() -> &'static RecordDescriptor {
        &ECHO_REPLY
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    #[serde(rename = "Count")]
    pub count: u32,
    #[serde(rename = "PageSize")]
    pub page_size: u32,
    /// Fail with an internal error after this many pages (0 = never).
    #[serde(rename = "FailAfter")]
    pub fail_after: u32,
}

static LIST_REQUEST_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor::scalar("count", FieldType::UInt).wire("Count"),
    FieldDescriptor::scalar("page_size", FieldType::UInt).wire("PageSize"),
    FieldDescriptor::scalar("fail_after", FieldType::UInt).wire("FailAfter"),
];
static LIST_REQUEST: RecordDescriptor = RecordDescriptor {
    name: "ListRequest",
    fields: &LIST_REQUEST_FIELDS,
};

impl Schema for ListRequest {
    fn descriptor() -> &'static RecordDescriptor {
        &LIST_REQUEST
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "Name")]
    pub name: String,
}

static ITEM_FIELDS: [FieldDescriptor; 2] = [
    FieldDescriptor::scalar("id", FieldType::UInt).wire("Id"),
    FieldDescriptor::scalar("name", FieldType::String).wire("Name"),
];
static ITEM: RecordDescriptor = RecordDescriptor {
    name: "Item",
    fields: &ITEM_FIELDS,
};

impl Schema for Item {
    fn descriptor() -> &'static RecordDescriptor {
        &ITEM
    }
}

/// One page of `ListItems`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemPage {
    #[serde(rename = "Total")]
    pub total: u32,
    #[serde(rename = "Items")]
    pub items: Vec<Item>,
    #[serde(rename = "Notes")]
    pub notes: Vec<String>,
}

static ITEM_PAGE_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor::scalar("total", FieldType::UInt).wire("Total"),
    FieldDescriptor::sequence("items", FieldType::Record(&ITEM)).wire("Items"),
    FieldDescriptor::sequence("notes", FieldType::String).wire("Notes"),
];
static ITEM_PAGE: RecordDescriptor = RecordDescriptor {
    name: "ItemPage",
    fields: &ITEM_PAGE_FIELDS,
};

impl Schema for ItemPage {
    fn descriptor() -> &'static RecordDescriptor {
        &ITEM_PAGE
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WhoamiRequest {}

static WHOAMI_REQUEST: RecordDescriptor = RecordDescriptor {
    name: "WhoamiRequest",
    fields: &[],
};

impl Schema for WhoamiRequest {
    fn descriptor() -> &'static RecordDescriptor {
        &WHOAMI_REQUEST
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Forwarded")]
    pub forwarded: bool,
}

static IDENTITY_FIELDS: [FieldDescriptor; 2] = [
    FieldDescriptor::scalar("user", FieldType::String).wire("User"),
    FieldDescriptor::scalar("forwarded", FieldType::Bool).wire("Forwarded"),
];
static IDENTITY: RecordDescriptor = RecordDescriptor {
    name: "Identity",
    fields: &IDENTITY_FIELDS,
};

impl Schema for Identity {
    fn descriptor() -> &'static RecordDescriptor {
        &IDENTITY
    }
}

/// The demo dispatch table.
pub fn table() -> MethodTable {
    MethodTable::new()
        .method("Echo", echo)
        .method("ListItems", list_items)
        .method("Whoami", whoami)
}

async fn echo(_ctx: CallContext, req: EchoRequest, _opts: CallOptions) -> CallResult {
    let repeat = req.repeat.max(1) as usize;
    match req.message.len().checked_mul(repeat) {
        Some(size) if size <= MAX_ECHO_BYTES => {}
        _ => {
            return Err(Status::invalid_argument(format!(
                "echo of {} bytes repeated {} times exceeds {} bytes",
                req.message.len(),
                repeat,
                MAX_ECHO_BYTES
            )))
        }
    }
    let reply = EchoReply {
        message: req.message.repeat(repeat),
        verbose: req.verbose,
        sent_at: req.sent_at,
    };
    let records: Vec<Box<dyn Record>> = vec![Box::new(reply)];
    Ok(Box::new(VecReceiver::new(records)))
}

async fn list_items(ctx: CallContext, req: ListRequest, _opts: CallOptions) -> CallResult {
    let page_size = req.page_size.max(1);
    let (tx, recv) = ChannelReceiver::channel(4);
    tokio::spawn(async move {
        let mut next = 0u32;
        let mut page = 0u32;
        while next < req.count {
            if req.fail_after > 0 && page == req.fail_after {
                let _ = tx.send(Err(Status::internal("listing interrupted"))).await;
                return;
            }
            let end = next.saturating_add(page_size).min(req.count);
            let record = ItemPage {
                total: req.count,
                items: (next..end)
                    .map(|id| Item {
                        id,
                        name: format!("item-{}", id),
                    })
                    .collect(),
                notes: vec![format!("page {}", page)],
            };
            if tx.send(Ok(Box::new(record) as Box<dyn Record>)).await.is_err() {
                tracing::debug!(request_id = ctx.request_id().unwrap_or("unknown"), page, "Listing abandoned");
                return;
            }
            next = end;
            page += 1;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
    Ok(Box::new(recv))
}

async fn whoami(ctx: CallContext, _req: WhoamiRequest, opts: CallOptions) -> CallResult {
    let Some(credential) = opts.metadata.get(AUTHORIZATION) else {
        return Err(Status::unauthenticated("no credentials"));
    };
    let (user, password) = credential.split_once(':').unwrap_or((credential.as_str(), ""));
    if password.is_empty() {
        return Err(Status::unknown("bad username or password"));
    }
    let identity = Identity {
        user: user.to_string(),
        forwarded: ctx.basic_auth().is_some(),
    };
    let records: Vec<Box<dyn Record>> = vec![Box::new(identity)];
    Ok(Box::new(VecReceiver::new(records)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{BasicAuth, DispatchTable, Receiver, RecvError};

    async fn collect(recv: &mut Box<dyn Receiver>) -> (Vec<Box<dyn Record>>, Option<Status>) {
        let mut records = Vec::new();
        loop {
            match recv.recv().await {
                Ok(record) => records.push(record),
                Err(RecvError::Exhausted) => return (records, None),
                Err(RecvError::Status(status)) => return (records, Some(status)),
            }
        }
    }

    #[test]
    fn test_table_lists_sorted_names() {
        assert_eq!(table().list(), vec!["Echo", "ListItems", "Whoami"]);
    }

    #[tokio::test]
    async fn test_echo_repeats() {
        let req = EchoRequest {
            message: "ab".into(),
            repeat: 3,
            ..Default::default()
        };
        let mut recv = echo(CallContext::new(), req, CallOptions::default()).await.unwrap();
        let record = recv.recv().await.unwrap();
        assert_eq!(record.downcast_ref::<EchoReply>().unwrap().message, "ababab");
    }

    #[tokio::test]
    async fn test_echo_rejects_oversized_reply() {
        for repeat in [u32::MAX, 3] {
            let req = EchoRequest {
                message: "x".repeat(1 << 20),
                repeat,
                ..Default::default()
            };
            let err = echo(CallContext::new(), req, CallOptions::default()).await.err().unwrap();
            assert_eq!(err.code(), crate::rpc::Code::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_list_items_pages() {
        let req = ListRequest {
            count: 5,
            page_size: 2,
            fail_after: 0,
        };
        let mut recv = table()
            .call("ListItems", CallContext::new(), Box::new(req), CallOptions::default())
            .await
            .unwrap();
        let (records, failure) = collect(&mut recv).await;
        assert!(failure.is_none());
        assert_eq!(records.len(), 3);
        let last = records[2].downcast_ref::<ItemPage>().unwrap();
        assert_eq!(last.items, vec![Item { id: 4, name: "item-4".into() }]);
        assert_eq!(last.notes, vec!["page 2".to_string()]);
    }

    #[tokio::test]
    async fn test_list_items_fails_after() {
        let req = ListRequest {
            count: 10,
            page_size: 2,
            fail_after: 2,
        };
        let mut recv = table()
            .call("ListItems", CallContext::new(), Box::new(req), CallOptions::default())
            .await
            .unwrap();
        let (records, failure) = collect(&mut recv).await;
        assert_eq!(records.len(), 2);
        assert_eq!(failure, Some(Status::internal("listing interrupted")));
    }

    #[tokio::test]
    async fn test_whoami() {
        let table = table();
        let err = table
            .call("Whoami", CallContext::new(), Box::new(WhoamiRequest {}), CallOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), crate::rpc::Code::Unauthenticated);

        let ctx = CallContext::new().with_basic_auth(BasicAuth::new("alice", "secret"));
        let mut opts = CallOptions::default();
        opts.metadata.insert(AUTHORIZATION.into(), "alice:secret".into());
        let mut recv = table.call("Whoami", ctx, Box::new(WhoamiRequest {}), opts).await.unwrap();
        let identity = recv.recv().await.unwrap();
        let identity = identity.downcast_ref::<Identity>().unwrap();
        assert_eq!(identity.user, "alice");
        assert!(identity.forwarded);

        let mut opts = CallOptions::default();
        opts.metadata.insert(AUTHORIZATION.into(), "alice:".into());
        let err = table
            .call("Whoami", CallContext::new(), Box::new(WhoamiRequest {}), opts)
            .await
            .err()
            .unwrap();
        assert!(err.is_auth_failure());
    }
}
