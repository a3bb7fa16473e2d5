//! Replays a short reserve/store/fetch scenario against a 27-byte queue,
//! printing the descriptor state after each step.

use byteq::{Config, Descriptor, Queue};

fn show(label: &str, q: &Queue) {
    println!("{label}: {}", q.debug_fmt());
}

fn main() {
    let q = Queue::new(Config::new(27, true, true));

    let hello = b">Hello World!<";
    let kreuzberg = b">Kreuzberg!<";

    let reserved = Descriptor::new();
    q.reserve(14, &reserved).expect("reserve 14");
    show("after reserve(14)", &q);
    let stored = Descriptor::new();
    q.store(hello, &reserved, &stored).expect("store hello");
    show("after store(hello)", &q);

    let reserved2 = Descriptor::new();
    q.reserve(12, &reserved2).expect("reserve 12");
    show("after reserve(12)", &q);
    let stored2 = Descriptor::new();
    q.store(kreuzberg, &reserved2, &stored2).expect("store kreuzberg");
    show("after store(kreuzberg)", &q);

    let mut fetch_buf = [0u8; 20];
    let fetched = Descriptor::new();
    let n = q.fetch(&mut fetch_buf, &fetched).expect("fetch hello");
    println!("fetched {n} bytes: {:?}", std::str::from_utf8(&fetch_buf[..n]).unwrap());
    show("after first fetch", &q);

    // A reservation that will outlive an interleaved fetch on the other side.
    let reserved3 = Descriptor::new();
    q.reserve(14, &reserved3).expect("reserve 14 again");
    show("after reserve(14) again", &q);

    let mut fetch_buf2 = [0u8; 20];
    let fetched2 = Descriptor::new();
    let n2 = q.fetch(&mut fetch_buf2, &fetched2).expect("fetch kreuzberg");
    println!("fetched {n2} bytes: {:?}", std::str::from_utf8(&fetch_buf2[..n2]).unwrap());
    show("after second fetch", &q);

    let stored3 = Descriptor::new();
    q.store(hello, &reserved3, &stored3).expect("store hello again");
    show("after store(hello) again", &q);

    let mut fetch_buf3 = [0u8; 20];
    let fetched3 = Descriptor::new();
    let n3 = q.fetch(&mut fetch_buf3, &fetched3).expect("fetch hello again");
    println!("fetched {n3} bytes: {:?}", std::str::from_utf8(&fetch_buf3[..n3]).unwrap());
    show("after third fetch", &q);

    let mut empty_fetch = [0u8; 20];
    let fetched4 = Descriptor::new();
    match q.fetch(&mut empty_fetch, &fetched4) {
        Ok(n) => println!("unexpectedly fetched {n} bytes from an empty queue"),
        Err(e) => println!("fetch from empty queue failed as expected: {e}"),
    }
    show("final state", &q);

    println!("metrics: {:?}", q.metrics());
}
