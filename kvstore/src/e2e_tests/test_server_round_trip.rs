//! Test: the TCP protocol against a real tree.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use super::helpers::simulated_tree;
use crate::server::serve;
use crate::server::wire::Request;
use crate::simulation::SimulatedStorage;
use crate::storage::BTree;

async fn start(tree: Arc<BTree<SimulatedStorage>>) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(serve(listener, tree, false, async move {
        let _ = rx.await;
    }));
    (addr, tx)
}

async fn connect(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(&[1]).await.expect("write version");
    stream
}

async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.expect("read response");
    buf
}

#[tokio::test]
async fn test_put_then_get_over_tcp() {
    let tree = Arc::new(simulated_tree(1024, 11));
    let (addr, _shutdown) = start(Arc::clone(&tree)).await;
    let mut stream = connect(addr).await;

    stream
        .write_all(b"pkey,value$gkey$gmissing$")
        .await
        .expect("write");

    assert_eq!(read_exactly(&mut stream, 9).await, b"svalue$f$");
    assert_eq!(tree.get(b"key").expect("get"), Some(b"value".to_vec()));
}

#[tokio::test]
async fn test_escaped_payloads_reach_the_tree() {
    let tree = Arc::new(simulated_tree(1024, 11));
    let (addr, _shutdown) = start(Arc::clone(&tree)).await;
    let mut stream = connect(addr).await;

    let put = Request::Put {
        key: b"a,b".to_vec(),
        value: b"1$2".to_vec(),
    };
    let get = Request::Get {
        key: b"a,b".to_vec(),
    };
    stream.write_all(&put.encode()).await.expect("write put");
    stream.write_all(&get.encode()).await.expect("write get");

    assert_eq!(read_exactly(&mut stream, 5).await, b"s1$2$");
    assert_eq!(tree.get(b"a,b").expect("get"), Some(b"1$2".to_vec()));
}

#[tokio::test]
async fn test_many_puts_split_the_tree() {
    let tree = Arc::new(simulated_tree(256, 3));
    let (addr, _shutdown) = start(Arc::clone(&tree)).await;
    let mut stream = connect(addr).await;

    let mut batch = Vec::new();
    for i in 0..100 {
        batch.extend_from_slice(format!("pk{i:03},v{i}$").as_bytes());
    }
    batch.extend_from_slice(b"gk042$gk099$gk100$");
    // Send in small pieces so messages straddle reads.
    for piece in batch.chunks(7) {
        stream.write_all(piece).await.expect("write");
    }

    assert_eq!(read_exactly(&mut stream, 12).await, b"sv42$sv99$f$");
    assert!(tree.height().expect("height") > 2);
}

#[tokio::test]
async fn test_writes_visible_across_connections() {
    let tree = Arc::new(simulated_tree(1024, 11));
    let (addr, _shutdown) = start(tree).await;

    let mut writer = connect(addr).await;
    writer.write_all(b"pshared,1$gshared$").await.expect("write");
    // The get answer orders it after the put on this connection.
    assert_eq!(read_exactly(&mut writer, 3).await, b"s1$");

    let mut reader = connect(addr).await;
    reader.write_all(b"gshared$").await.expect("write");
    assert_eq!(read_exactly(&mut reader, 3).await, b"s1$");
}

#[tokio::test]
async fn test_oversize_put_is_dropped() {
    let tree = Arc::new(simulated_tree(256, 3));
    let (addr, _shutdown) = start(tree).await;
    let mut stream = connect(addr).await;

    let mut message = b"pbig,".to_vec();
    message.extend(std::iter::repeat_n(b'x', 200));
    message.extend_from_slice(b"$gbig$psmall,ok$gsmall$");
    stream.write_all(&message).await.expect("write");

    assert_eq!(read_exactly(&mut stream, 6).await, b"f$sok$");
}
