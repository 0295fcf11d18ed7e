#![cfg(loom)]

//! 有界队列发布协议的 loom 穷举验证。
//!
//! 以 `RUSTFLAGS="--cfg loom" cargo test -p tapline --test loom_concurrency --release` 运行；
//! 此时队列内部的原子与槽位单元替换为 loom 模型类型。

use loom::{model, sync::Arc, thread};
use tapline::BoundedQueue;

#[test]
fn concurrent_pushes_are_each_popped_once() {
    //
    // 教案级说明：两个生产者争抢同一个容量为 2 的队列。
    // - **Why**：入队 CAS 与序号发布之间的窗口是协议中最容易出错的位置；
    // - **What**：无论交错如何，两条记录都入队成功，且恰好各被取出一次。
    model(|| {
        let queue = Arc::new(BoundedQueue::<u32>::with_capacity(2).expect("合法容量"));
        let handles: Vec<_> = [1_u32, 2]
            .into_iter()
            .map(|value| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.try_push(value).is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("生产者不应 panic"), "容量足够时入队必须成功");
        }

        let mut popped = [queue.try_pop(), queue.try_pop()];
        popped.sort();
        assert_eq!(popped, [Some(1), Some(2)]);
        assert_eq!(queue.try_pop(), None);
    });
}

#[test]
fn consumer_never_observes_unpublished_slot() {
    //
    // 教案级说明：生产者与消费者并发运行。
    // - **Why**：消费者只能在序号以 Release 发布之后读取槽位，否则会读到未初始化内存；
    // - **What**：消费者要么看到空队列，要么看到完整写入的值；值不会丢失。
    model(|| {
        let queue = Arc::new(BoundedQueue::<u32>::with_capacity(2).expect("合法容量"));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                assert!(queue.try_push(7).is_ok());
            })
        };
        let early = queue.try_pop();
        producer.join().expect("生产者不应 panic");
        match early {
            Some(value) => {
                assert_eq!(value, 7);
                assert_eq!(queue.try_pop(), None);
            }
            None => assert_eq!(queue.try_pop(), Some(7)),
        }
    });
}

#[test]
fn full_queue_rejects_without_losing_records() {
    model(|| {
        let queue = Arc::new(BoundedQueue::<u32>::with_capacity(2).expect("合法容量"));
        assert!(queue.try_push(1).is_ok());
        assert!(queue.try_push(2).is_ok());

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.try_pop())
        };
        let pushed = queue.try_push(3);
        let first = consumer.join().expect("消费者不应 panic");
        assert_eq!(first, Some(1));

        let mut rest = Vec::new();
        while let Some(value) = queue.try_pop() {
            rest.push(value);
        }
        match pushed {
            Ok(()) => assert_eq!(rest, vec![2, 3]),
            Err(rejected) => {
                assert_eq!(rejected, 3);
                assert_eq!(rest, vec![2]);
            }
        }
    });
}
