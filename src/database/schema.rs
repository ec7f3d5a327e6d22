pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS track_info (
        track_id TEXT PRIMARY KEY,
        track_name TEXT NOT NULL,
        artist_name TEXT NOT NULL,
        artist_id TEXT NOT NULL,
        release_date TEXT
    );

    CREATE TABLE IF NOT EXISTS top_hundred_tracks (
        track_id TEXT PRIMARY KEY,
        track_name TEXT NOT NULL,
        artist_name TEXT NOT NULL,
        album_name TEXT NOT NULL,
        release_date TEXT
    );

    CREATE TABLE IF NOT EXISTS track_popularity (
        track_id TEXT PRIMARY KEY,
        popularity INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS albums (
        album_id TEXT PRIMARY KEY,
        album_name TEXT NOT NULL,
        release_date TEXT,
        artist_id TEXT,
        spotify_url TEXT,
        total_tracks INTEGER
    );

    CREATE TABLE IF NOT EXISTS artist_details (
        artist_id TEXT PRIMARY KEY,
        artist_name TEXT NOT NULL,
        genres TEXT NOT NULL,
        popularity INTEGER NOT NULL,
        followers INTEGER NOT NULL,
        spotify_url TEXT
    );

    CREATE TABLE IF NOT EXISTS artist_popularity (
        artist_id TEXT PRIMARY KEY,
        popularity INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS artist_genres (
        artist_id TEXT NOT NULL,
        genre TEXT NOT NULL,
        PRIMARY KEY(artist_id, genre)
    );

    CREATE TABLE IF NOT EXISTS audio_features (
        track_id TEXT PRIMARY KEY,
        danceability REAL NOT NULL,
        energy REAL NOT NULL,
        key INTEGER NOT NULL,
        loudness REAL NOT NULL,
        mode INTEGER NOT NULL,
        speechiness REAL NOT NULL,
        acousticness REAL NOT NULL,
        instrumentalness REAL NOT NULL,
        liveness REAL NOT NULL,
        valence REAL NOT NULL,
        tempo REAL NOT NULL,
        duration_ms INTEGER,
        time_signature INTEGER
    );
";

/// Tables reported by `status`, seed tables first.
pub const TABLES: [&str; 8] = [
    "track_info",
    "top_hundred_tracks",
    "track_popularity",
    "albums",
    "artist_details",
    "artist_popularity",
    "artist_genres",
    "audio_features",
];
