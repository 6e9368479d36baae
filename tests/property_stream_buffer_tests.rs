use proptest::prelude::*;
use telemetry_feed::core::{ChannelId, Sample, StreamBuffer, WindowSpec};

proptest! {
    #[test]
    fn buffer_never_exceeds_capacity_and_keeps_newest(
        capacity in 1usize..64,
        steps in proptest::collection::vec(0.0f64..5.0, 0..256)
    ) {
        let channel = ChannelId::new("prop").expect("channel");
        let mut buffer = StreamBuffer::new(channel.clone(), capacity).expect("buffer");

        let mut t = 0.0;
        let mut appended = Vec::with_capacity(steps.len());
        for step in steps {
            t += step;
            buffer
                .append(Sample::new(channel.clone(), t, step).expect("sample"))
                .expect("monotonic append");
            appended.push(t);
            prop_assert!(buffer.len() <= capacity);
        }

        let expected_len = appended.len().min(capacity);
        prop_assert_eq!(buffer.len(), expected_len);
        let stored: Vec<f64> = buffer.iter().map(Sample::timestamp).collect();
        prop_assert_eq!(stored, appended[appended.len() - expected_len..].to_vec());
    }

    #[test]
    fn buffer_stays_ordered_under_arbitrary_timestamps(
        capacity in 1usize..32,
        stamps in proptest::collection::vec(-1_000.0f64..1_000.0, 0..128)
    ) {
        let channel = ChannelId::new("prop").expect("channel");
        let mut buffer = StreamBuffer::new(channel.clone(), capacity).expect("buffer");

        let mut accepted = 0u64;
        for t in &stamps {
            if buffer.append(Sample::new(channel.clone(), *t, 0.0).expect("sample")).is_ok() {
                accepted += 1;
            }
        }

        prop_assert_eq!(accepted + buffer.rejected_count(), stamps.len() as u64);
        let stored: Vec<f64> = buffer.iter().map(Sample::timestamp).collect();
        prop_assert!(stored.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn latest_window_length_is_bounded(
        len in 0usize..64,
        count in 0usize..96
    ) {
        let channel = ChannelId::new("prop").expect("channel");
        let mut buffer = StreamBuffer::new(channel.clone(), 64).expect("buffer");
        for i in 0..len {
            buffer
                .append(Sample::new(channel.clone(), i as f64, 0.0).expect("sample"))
                .expect("append");
        }
        let window = buffer.window(WindowSpec::Latest(count));
        prop_assert_eq!(window.len(), count.min(len));
        if let (Some(last), Some(newest)) = (window.last(), buffer.newest()) {
            prop_assert_eq!(last, newest);
        }
    }
}
